use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{AudioMode, EncodingProfile, FlipSelection, OutputFormat, SpeedPreset};
use crate::job::{JobSettings, TimeoutPolicy};
use crate::workspace;

#[derive(Parser, Debug)]
#[command(
    name = "vidflip",
    version,
    about = "Mirror videos horizontally or vertically with FFmpeg",
    long_about = "vidflip - flip a video left-right, upside-down, or both.\n\n\
                  Examples:\n  \
                  vidflip clip.mp4 --flip-h\n  \
                  vidflip clip.mov mirrored.mp4 --flip-h --flip-v --crf 20\n  \
                  vidflip clip.mkv --flip-v --copy-audio --format mkv\n  \
                  vidflip clip.mp4 --info"
)]
pub struct Cli {
    /// Input video file
    pub input: String,

    /// Where to save the result (default: <input>_flipped.<format> beside the input)
    pub output: Option<String>,

    /// Flip horizontally (mirror left-right)
    #[arg(long)]
    pub flip_h: bool,

    /// Flip vertically (upside-down)
    #[arg(long)]
    pub flip_v: bool,

    /// Quality as CRF (0-51, lower = better quality, larger file)
    #[arg(long, default_value = "17", value_parser = clap::value_parser!(u8).range(0..=51))]
    pub crf: u8,

    /// Encoder speed preset
    #[arg(short, long, value_enum, default_value = "fast")]
    pub preset: PresetArg,

    /// Video encoder
    #[arg(long, default_value = "libx264")]
    pub video_codec: String,

    /// Audio encoder (ignored with --copy-audio)
    #[arg(long, default_value = "aac")]
    pub audio_codec: String,

    /// Audio bitrate in kbps (ignored with --copy-audio)
    #[arg(long, default_value = "192")]
    pub audio_bitrate: u32,

    /// Copy the audio track unchanged instead of re-encoding it
    #[arg(long)]
    pub copy_audio: bool,

    /// Move container metadata to the front for progressive playback
    #[arg(long)]
    pub faststart: bool,

    /// Output container (default: from the output path's extension, else mp4)
    #[arg(short, long, value_enum)]
    pub format: Option<FormatArg>,

    /// Largest accepted input in MB (0 = unlimited)
    #[arg(long, default_value = "200")]
    pub max_size: u64,

    /// Give up on FFmpeg after this many seconds (default scales with file size)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Directory for per-job scratch files
    #[arg(long)]
    pub workspace_dir: Option<PathBuf>,

    /// Overwrite output file without asking
    #[arg(short = 'y', long)]
    pub overwrite: bool,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show video info without flipping
    #[arg(long)]
    pub info: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum PresetArg {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl From<PresetArg> for SpeedPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Ultrafast => SpeedPreset::Ultrafast,
            PresetArg::Superfast => SpeedPreset::Superfast,
            PresetArg::Veryfast => SpeedPreset::Veryfast,
            PresetArg::Faster => SpeedPreset::Faster,
            PresetArg::Fast => SpeedPreset::Fast,
            PresetArg::Medium => SpeedPreset::Medium,
            PresetArg::Slow => SpeedPreset::Slow,
            PresetArg::Slower => SpeedPreset::Slower,
            PresetArg::Veryslow => SpeedPreset::Veryslow,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Mp4,
    Mov,
    Mkv,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Mp4 => OutputFormat::Mp4,
            FormatArg::Mov => OutputFormat::Mov,
            FormatArg::Mkv => OutputFormat::Mkv,
        }
    }
}

/// Everything one run of the tool needs, whichever front end collected it
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_path: String,
    pub output_path: Option<String>,
    pub selection: FlipSelection,
    pub profile: EncodingProfile,
    pub settings: JobSettings,
    pub overwrite: bool,
    pub json: bool,
}

impl Cli {
    pub fn selection(&self) -> FlipSelection {
        FlipSelection::new(self.flip_h, self.flip_v)
    }

    pub fn profile(&self) -> EncodingProfile {
        let audio = if self.copy_audio {
            AudioMode::Copy
        } else {
            AudioMode::Encode {
                codec: self.audio_codec.clone(),
                bitrate_kbps: self.audio_bitrate,
            }
        };

        EncodingProfile {
            video_codec: self.video_codec.clone(),
            quality: self.crf,
            preset: self.preset.into(),
            audio,
            faststart: self.faststart,
            format: self.output_format(),
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
            .map(OutputFormat::from)
            .or_else(|| {
                self.output
                    .as_deref()
                    .and_then(|out| Path::new(out).extension())
                    .and_then(|ext| ext.to_str())
                    .and_then(OutputFormat::from_extension)
            })
            .unwrap_or_default()
    }

    pub fn settings(&self) -> JobSettings {
        JobSettings {
            workspace_root: self
                .workspace_dir
                .clone()
                .unwrap_or_else(workspace::default_root),
            max_upload_bytes: (self.max_size > 0).then(|| self.max_size.saturating_mul(1024 * 1024)),
            timeout: self
                .timeout
                .map(|secs| TimeoutPolicy::fixed(Duration::from_secs(secs)))
                .unwrap_or_default(),
        }
    }

    pub fn to_config(&self) -> RunConfig {
        RunConfig {
            input_path: self.input.clone(),
            output_path: self.output.clone(),
            selection: self.selection(),
            profile: self.profile(),
            settings: self.settings(),
            overwrite: self.overwrite,
            json: self.json,
        }
    }
}
