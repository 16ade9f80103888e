use colored::*;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect, Select};
use std::io::{self, Write};

use crate::cli::RunConfig;
use crate::domain::{AudioMode, EncodingProfile, FlipSelection, SpeedPreset};
use crate::fs;
use crate::job::JobSettings;

/// Wait for user to press Enter before exiting
pub fn wait_for_exit() {
    println!();
    println!("{}", "Press Enter to exit...".dimmed());
    let _ = io::stdout().flush();
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);
}

/// Interactive wizard. If `provided_path` is set (drag & drop onto the
/// executable) the file prompt is skipped. Returns `None` when the user backs out.
pub fn run_interactive(provided_path: Option<String>) -> Option<RunConfig> {
    print_interactive_header();

    let input_path = match provided_path {
        Some(path) => {
            let cleaned = clean_path(&path);
            println!("{} {}", "File:".dimmed(), cleaned.bright_cyan());
            println!();
            cleaned
        }
        None => {
            let path = prompt_input_path();
            if path.is_empty() {
                return None;
            }
            path
        }
    };

    if !fs::is_video_file(&input_path) {
        println!("{}", "This is not a valid video file!".bright_red());
        return None;
    }

    let theme = ColorfulTheme::default();
    let selection = prompt_selection(&theme)?;
    let profile = prompt_profile(&theme);
    let output_path = fs::generate_output_path(&input_path, profile.format);

    println!();
    println!("{}", "━".repeat(50).dimmed());
    println!("{}", "Summary".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());
    println!("  {} {}", "Input:".dimmed(), input_path.bright_white());
    println!("  {} {}", "Output:".dimmed(), output_path.bright_cyan());
    println!("  {} {}", "Flip:".dimmed(), selection.to_string().bright_green());
    println!(
        "  {} crf {} / {}",
        "Quality:".dimmed(),
        profile.quality.to_string().bright_yellow(),
        profile.preset
    );
    if profile.audio_passthrough() {
        println!("  {} {}", "Audio:".dimmed(), "copy".bright_blue());
    }
    println!("{}", "━".repeat(50).dimmed());
    println!();

    let proceed = Confirm::with_theme(&theme)
        .with_prompt("Start processing?")
        .default(true)
        .interact()
        .unwrap_or(false);

    if !proceed {
        println!("{}", "Cancelled.".bright_yellow());
        return None;
    }

    println!();

    Some(RunConfig {
        input_path,
        output_path: Some(output_path),
        selection,
        profile,
        settings: JobSettings::default(),
        overwrite: true,
        json: false,
    })
}

fn print_interactive_header() {
    println!();
    println!("{}", "━".repeat(50).dimmed());
    println!(
        "{}",
        format!("  vidflip v{} - Interactive Mode", env!("CARGO_PKG_VERSION"))
            .bright_cyan()
            .bold()
    );
    println!("{}", "━".repeat(50).dimmed());
    println!();
}

/// Strip the quotes Windows adds when dragging a file into the console
fn clean_path(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

fn prompt_input_path() -> String {
    println!("{}", "Drag & drop video file here or enter path:".bright_white());
    println!("{}", "(Press Enter without input to exit)".dimmed());
    println!();

    let input: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Video path")
        .allow_empty(true)
        .interact_text()
        .unwrap_or_default();

    clean_path(&input)
}

/// Ask until at least one direction is ticked. `None` if the prompt is aborted.
fn prompt_selection(theme: &ColorfulTheme) -> Option<FlipSelection> {
    println!("{}", "Flip Options".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());
    println!();

    let options = ["Flip horizontally", "Flip vertically"];
    loop {
        let picked = MultiSelect::with_theme(theme)
            .with_prompt("Directions (space to toggle, enter to confirm)")
            .items(&options)
            .defaults(&[true, false])
            .interact()
            .ok()?;

        let selection = FlipSelection::new(picked.contains(&0), picked.contains(&1));
        if !selection.is_empty() {
            println!();
            return Some(selection);
        }
        println!(
            "{}",
            "Please select at least one flip direction.".bright_yellow()
        );
    }
}

fn prompt_profile(theme: &ColorfulTheme) -> EncodingProfile {
    let mut profile = EncodingProfile::default();

    println!("{}", "Encoding Settings".bright_white().bold());
    println!("{}", "─".repeat(30).dimmed());
    println!();

    profile.quality = Input::with_theme(theme)
        .with_prompt("Quality (CRF 0-51, lower = better)")
        .default(profile.quality)
        .validate_with(|input: &u8| {
            if *input <= EncodingProfile::MAX_QUALITY {
                Ok(())
            } else {
                Err("CRF must be between 0 and 51")
            }
        })
        .interact()
        .unwrap_or(profile.quality);

    let presets: Vec<&str> = SpeedPreset::ALL.iter().map(|p| p.as_str()).collect();
    let default_idx = SpeedPreset::ALL
        .iter()
        .position(|p| *p == profile.preset)
        .unwrap_or(0);
    let preset_idx = Select::with_theme(theme)
        .with_prompt("Speed preset")
        .items(&presets)
        .default(default_idx)
        .interact()
        .unwrap_or(default_idx);
    profile.preset = SpeedPreset::ALL[preset_idx];

    let copy_audio = Confirm::with_theme(theme)
        .with_prompt("Copy audio without re-encoding?")
        .default(false)
        .interact()
        .unwrap_or(false);
    if copy_audio {
        profile.audio = AudioMode::Copy;
    }

    profile.faststart = Confirm::with_theme(theme)
        .with_prompt("Optimize for web streaming (fast start)?")
        .default(false)
        .interact()
        .unwrap_or(false);

    profile
}
