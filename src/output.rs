use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

use crate::cli::RunConfig;
use crate::domain::{AudioMode, FlipResult, VideoInfo};
use crate::error::FlipError;
use crate::fs::{format_duration, format_size};
use crate::progress::{ProgressEvent, ProgressMetrics};

/// Print application header
pub fn print_header() {
    println!();
    println!(
        "{}",
        format!("  vidflip v{}", env!("CARGO_PKG_VERSION")).bright_cyan().bold()
    );
    println!("{}", "━".repeat(50).dimmed());
    println!();
}

/// Print video information
pub fn print_video_info(path: &str, info: &VideoInfo, size: u64) {
    println!("{}", "Video Information".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());

    println!("  {} {}", "File:".dimmed(), path.bright_white());
    println!("  {} {}", "Size:".dimmed(), format_size(size).bright_yellow());

    if let Some(duration) = &info.duration {
        println!("  {} {}", "Duration:".dimmed(), duration.bright_white());
    }

    if let Some((w, h)) = info.dimensions {
        println!(
            "  {} {}x{}",
            "Resolution:".dimmed(),
            w.to_string().bright_white(),
            h.to_string().bright_white()
        );
    }

    if let Some(fps) = info.fps {
        println!(
            "  {} {} fps",
            "Frame rate:".dimmed(),
            format!("{:.2}", fps).bright_white()
        );
    }

    if let Some(codec) = &info.audio_codec {
        println!("  {} {}", "Audio:".dimmed(), codec.bright_white());
    }

    println!();
}

/// Print flip settings
pub fn print_config(config: &RunConfig, output_path: &str) {
    println!("{}", "Flip Settings".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());

    println!("  {} {}", "Input:".dimmed(), config.input_path.bright_white());
    println!("  {} {}", "Output:".dimmed(), output_path.bright_white());
    println!(
        "  {} {}",
        "Flip:".dimmed(),
        config.selection.to_string().bright_green()
    );
    println!(
        "  {} {} (crf {}, {})",
        "Video:".dimmed(),
        config.profile.video_codec.bright_white(),
        config.profile.quality.to_string().bright_yellow(),
        config.profile.preset
    );

    match &config.profile.audio {
        AudioMode::Encode {
            codec,
            bitrate_kbps,
        } => println!(
            "  {} {} {}k",
            "Audio:".dimmed(),
            codec.bright_white(),
            bitrate_kbps
        ),
        AudioMode::Copy => println!("  {} {}", "Audio:".dimmed(), "copy".bright_blue()),
    }

    if config.profile.faststart {
        println!("  {} {}", "Streaming:".dimmed(), "fast start".bright_white());
    }

    println!();
}

/// Create the transcode progress bar. Starts as a spinner until a
/// percentage is known.
pub fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Processing...");
    pb
}

/// Update progress bar with percent and ETA
pub fn update_progress(pb: &ProgressBar, event: ProgressEvent, metrics: &mut ProgressMetrics) {
    match event {
        ProgressEvent::Processing => pb.set_message("Processing... (duration unknown)"),
        ProgressEvent::Percent { percent } => {
            metrics.update_progress(percent as f64);
            pb.set_position(percent as u64);

            let eta_msg = match metrics.calculate_eta() {
                Some(eta_secs) => {
                    let eta_mins = (eta_secs / 60.0) as u64;
                    let eta_secs_rem = (eta_secs % 60.0) as u64;
                    format!("{:02}:{:02}", eta_mins, eta_secs_rem)
                }
                None => "--:--".to_string(),
            };

            pb.set_message(format!("{}% | ETA: {}", percent, eta_msg));
        }
    }
}

pub fn finish_progress(pb: &ProgressBar) {
    pb.finish_with_message("Done!");
}

/// Print flip result
pub fn print_result(result: &FlipResult, saved_to: &str, elapsed: Duration) {
    println!();
    println!("{}", "━".repeat(50).dimmed());
    println!(
        "{} {}",
        "✓".bright_green().bold(),
        "Video flipped!".bright_green().bold()
    );
    println!();

    println!(
        "  {} {}",
        "Original:".dimmed(),
        format_size(result.original_size).bright_white()
    );
    println!(
        "  {} {}",
        "Flipped:".dimmed(),
        format_size(result.output_size).bright_green()
    );
    if let Some(duration) = result.duration_seconds {
        println!("  {} {}", "Length:".dimmed(), format_duration(duration));
    }
    println!("  {} {:.2}s", "Time:".dimmed(), elapsed.as_secs_f64());
    println!();
    println!("  {} {}", "Output:".dimmed(), saved_to.bright_cyan());
    println!();
}

/// Print error message with actionable hints based on error type.
/// FFmpeg's own diagnostics follow verbatim.
pub fn print_error_with_hint(error: &FlipError) {
    eprintln!();
    eprintln!("{} {}", "✗".bright_red().bold(), error.to_string().bright_red());
    eprintln!();

    let hint = match error {
        FlipError::InvalidSelection => {
            "💡 Choose a direction:\n\
             \n\
               • --flip-h  mirror left-right\n\
               • --flip-v  turn upside-down\n\
               • both flags together rotate the picture 180°"
                .to_string()
        }
        FlipError::UploadTooLarge { limit, .. } => format!(
            "💡 The limit is {}. Raise it with --max-size <MB> or use --max-size 0 to disable it.",
            format_size(*limit)
        ),
        FlipError::FfmpegNotFound => {
            "💡 How to install FFmpeg:\n\
             \n\
             Windows:\n\
               • winget install Gyan.FFmpeg\n\
             \n\
             macOS:\n\
               • brew install ffmpeg\n\
             \n\
             Linux:\n\
               • sudo apt install ffmpeg  (Debian/Ubuntu)\n\
               • sudo dnf install ffmpeg  (Fedora)\n\
             \n\
             Or point VIDFLIP_FFMPEG_PATH at an ffmpeg binary."
                .to_string()
        }
        FlipError::InvalidInput(_) => {
            "💡 Supported video formats: MP4, MOV, AVI, MKV, WebM, M4V.\n\
             Check that the file is a video and is not corrupted."
                .to_string()
        }
        FlipError::InvalidOutput(_) => {
            "💡 Pass -y to overwrite, or choose another output path.".to_string()
        }
        FlipError::TranscodeTimeout { .. } => {
            "💡 Try again with a smaller file, a faster --preset, or a longer --timeout."
                .to_string()
        }
        FlipError::TranscodeFailed { .. } | FlipError::OutputMissing { .. } => {
            "💡 FFmpeg could not produce the video. Its full output is below.".to_string()
        }
        FlipError::IncompatibleAudioStream { .. } => {
            "💡 Drop --copy-audio to re-encode the audio, or use --format mkv.".to_string()
        }
        FlipError::WorkspaceIo { .. } => {
            "💡 This is a storage problem, not a video problem:\n\
             \n\
               • Check available disk space\n\
               • Check write permissions on the workspace directory (--workspace-dir)"
                .to_string()
        }
        FlipError::SpawnFailed(_) | FlipError::Io(_) => {
            "💡 Check file permissions and available disk space.".to_string()
        }
        FlipError::Cancelled => {
            "💡 Nothing was saved. You can start again anytime.".to_string()
        }
    };

    eprintln!("{}", hint.bright_blue());
    eprintln!();

    if let Some(diagnostics) = error.diagnostics() {
        eprintln!("{}", "FFmpeg output".bright_white().bold());
        eprintln!("{}", "─".repeat(30).dimmed());
        eprintln!("{}", diagnostics.dimmed());
    }
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".bright_yellow().bold(), message.bright_yellow());
}

/// Print cancelled message
pub fn print_cancelled() {
    println!();
    println!(
        "{} {}",
        "⚠".bright_yellow().bold(),
        "Cancelled by user.".bright_yellow()
    );
    println!();
}

// ============================================================================
// JSON Output
// ============================================================================

#[derive(Serialize)]
pub struct VideoInfoJson<'a> {
    pub path: &'a str,
    pub size: u64,
    pub size_formatted: String,
    #[serde(flatten)]
    pub info: &'a VideoInfo,
}

#[derive(Serialize)]
pub struct FlipResultJson<'a> {
    pub success: bool,
    pub elapsed_seconds: f64,
    pub saved_to: &'a str,
    #[serde(flatten)]
    pub result: &'a FlipResult,
}

#[derive(Serialize)]
pub struct ErrorJson<'a> {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<&'a str>,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

pub fn print_video_info_json(path: &str, info: &VideoInfo, size: u64) {
    print_json(&VideoInfoJson {
        path,
        size,
        size_formatted: format_size(size),
        info,
    });
}

pub fn print_result_json(result: &FlipResult, saved_to: &str, elapsed: Duration) {
    print_json(&FlipResultJson {
        success: true,
        elapsed_seconds: elapsed.as_secs_f64(),
        saved_to,
        result,
    });
}

pub fn print_error_json(error: &FlipError) {
    print_json(&ErrorJson {
        success: false,
        error: error.to_string(),
        diagnostics: error.diagnostics(),
    });
}
