mod cli;
mod domain;
mod error;
mod ffmpeg;
mod filter;
mod fs;
mod interactive;
mod job;
mod logging;
mod output;
mod progress;
mod sink;
mod workspace;

#[cfg(all(test, unix))]
mod testutil;

use clap::Parser;
use indicatif::ProgressBar;
use std::env;
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;

use cli::{Cli, RunConfig};
use error::FlipError;
use ffmpeg::{FFmpeg, Transcoder, PROBE_TIMEOUT};
use output::*;
use progress::ProgressMetrics;

fn main() {
    let args: Vec<String> = env::args().collect();

    // No arguments, or a single path dropped onto the executable, opens the wizard
    let is_interactive = args.len() == 1 || (args.len() == 2 && !args[1].starts_with('-'));

    let config = if is_interactive {
        logging::init(false);
        match interactive::run_interactive(args.get(1).cloned()) {
            Some(cfg) => cfg,
            None => {
                interactive::wait_for_exit();
                return;
            }
        }
    } else {
        let cli = Cli::parse();
        logging::init(cli.verbose);

        if cli.info {
            std::process::exit(run_info_mode(&cli));
        }

        cli.to_config()
    };

    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        cancelled_clone.store(true, Ordering::Relaxed);
    }) {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
    }

    let code = match run(&config, &cancelled) {
        Ok(()) => 0,
        Err(e) => {
            if config.json {
                print_error_json(&e);
            } else if matches!(e, FlipError::Cancelled) {
                print_cancelled();
            } else {
                print_error_with_hint(&e);
            }
            e.exit_code()
        }
    };

    if is_interactive {
        interactive::wait_for_exit();
    }

    std::process::exit(code);
}

fn run_info_mode(cli: &Cli) -> i32 {
    let report = |e: &FlipError| {
        if cli.json {
            print_error_json(e);
        } else {
            print_error_with_hint(e);
        }
        e.exit_code()
    };

    if !cli.json {
        print_header();
    }

    let ffmpeg = match FFmpeg::new() {
        Ok(f) => f,
        Err(e) => return report(&e),
    };

    let size = match std::fs::metadata(&cli.input) {
        Ok(meta) => meta.len(),
        Err(_) => return report(&FlipError::InvalidInput(format!("File not found: {}", cli.input))),
    };

    match ffmpeg.probe(Path::new(&cli.input), PROBE_TIMEOUT, &AtomicBool::new(false)) {
        Ok(info) if cli.json => print_video_info_json(&cli.input, &info, size),
        Ok(info) => print_video_info(&cli.input, &info, size),
        Err(e) => return report(&e),
    }

    0
}

fn run(config: &RunConfig, cancelled: &AtomicBool) -> error::Result<()> {
    if !config.json {
        print_header();
    }

    // A missing transcoder is a setup problem; surface it before touching the input
    let ffmpeg = FFmpeg::new()?;
    tracing::debug!(binary = ffmpeg.binary(), "ffmpeg located");

    if !fs::is_video_file(&config.input_path) {
        return Err(FlipError::InvalidInput(format!(
            "{} is not a valid video file",
            config.input_path
        )));
    }

    config.selection.ensure_not_empty()?;

    let output_path = config
        .output_path
        .clone()
        .unwrap_or_else(|| fs::generate_output_path(&config.input_path, config.profile.format));

    let extension = Path::new(&output_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if !config.json && !extension.eq_ignore_ascii_case(config.profile.format.extension()) {
        print_warning(&format!(
            "{} will contain a .{} container",
            output_path, config.profile.format
        ));
    }

    if !config.overwrite && Path::new(&output_path).exists() {
        if !config.json {
            print_warning(&format!("Output file already exists: {}", output_path));
        }
        return Err(FlipError::InvalidOutput(format!(
            "File already exists: {}. Use -y to overwrite.",
            output_path
        )));
    }

    let upload = fs::load_upload(&config.input_path, config.settings.max_upload_bytes)?;

    if !config.json {
        print_config(config, &output_path);
    }

    let progress_bar = if config.json || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };
    let mut metrics = ProgressMetrics::new(upload.declared_size);

    let start_time = Instant::now();
    let outcome = job::submit(
        &ffmpeg,
        &upload,
        config.selection,
        &config.profile,
        &config.settings,
        cancelled,
        |event| update_progress(&progress_bar, event, &mut metrics),
    );

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            progress_bar.abandon();
            return Err(e);
        }
    };
    finish_progress(&progress_bar);

    let download = sink::present(&result.bytes, &result.file_name, config.profile.format);
    tracing::debug!(
        file = download.file_name,
        mime = download.mime_type,
        bytes = download.bytes.len(),
        "saving download"
    );
    fs::save_download(&output_path, download.bytes, config.overwrite)?;

    let elapsed = start_time.elapsed();
    if config.json {
        print_result_json(&result, &output_path, elapsed);
    } else {
        print_result(&result, &output_path, elapsed);
    }

    Ok(())
}
