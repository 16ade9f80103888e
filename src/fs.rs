use std::fs;
use std::path::Path;

use crate::domain::{OutputFormat, Upload};
use crate::error::{FlipError, Result};
use crate::sink;

/// Extensions the upload form accepts
const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "avi", "mkv", "webm", "m4v"];

/// Check if file is a valid video file
pub fn is_video_file(path: &str) -> bool {
    if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
        if VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
            return true;
        }
    }

    // Also check by magic bytes
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return kind.mime_type().starts_with("video/");
    }

    false
}

/// Read a local file the way a form upload would hand it over.
///
/// The size ceiling is checked against file metadata first so an oversized
/// file is refused without being read.
pub fn load_upload(path: &str, max_bytes: Option<u64>) -> Result<Upload> {
    let file_path = Path::new(path);
    if !file_path.is_file() {
        return Err(FlipError::InvalidInput(format!("File not found: {}", path)));
    }

    let declared_size = fs::metadata(file_path)?.len();
    if let Some(limit) = max_bytes {
        if declared_size > limit {
            return Err(FlipError::UploadTooLarge {
                size: declared_size,
                limit,
            });
        }
    }

    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("video")
        .to_string();

    Ok(Upload::new(file_name, fs::read(file_path)?))
}

/// Default save location: `<stem>_flipped.<ext>` beside the input
pub fn generate_output_path(input: &str, format: OutputFormat) -> String {
    let input_path = Path::new(input);
    let file_name = input_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("video");
    let output_name = sink::suggested_file_name(file_name, format);

    match input_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(output_name).to_string_lossy().to_string()
        }
        _ => output_name,
    }
}

/// Write the downloaded bytes, refusing to clobber unless asked
pub fn save_download(path: &str, bytes: &[u8], overwrite: bool) -> Result<()> {
    if !overwrite && Path::new(path).exists() {
        return Err(FlipError::InvalidOutput(format!(
            "File already exists: {}. Use -y to overwrite.",
            path
        )));
    }
    fs::write(path, bytes)?;
    Ok(())
}

/// Format bytes to human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration in seconds to human-readable time
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        return "0s".to_string();
    }

    let total_seconds = seconds.round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
