use std::path::Path;
use std::process::Command;

use crate::ffmpeg::FFmpeg;

/// Write a shell script that stands in for ffmpeg.
///
/// A separate `sh` writes the file so this process never holds a writable
/// handle on it; exec'ing a file another thread's fork still has open for
/// writing fails with ETXTBSY.
pub fn fake_ffmpeg(dir: &Path, body: &str) -> FFmpeg {
    let path = dir.join("fake-ffmpeg");
    let script = format!("#!/bin/sh\n{}\n", body);
    let status = Command::new("sh")
        .arg("-c")
        .arg("printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"")
        .arg("sh")
        .arg(&script)
        .arg(&path)
        .status()
        .expect("sh is available");
    assert!(status.success(), "could not write fake ffmpeg");
    FFmpeg::with_binary(path.to_string_lossy().to_string())
}
