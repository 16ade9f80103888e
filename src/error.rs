use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlipError {
    #[error("Select at least one flip direction (horizontal or vertical)")]
    InvalidSelection,

    #[error("Upload is too large: {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge { size: u64, limit: u64 },

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Invalid output path: {0}")]
    InvalidOutput(String),

    #[error("FFmpeg not found. Install FFmpeg or set VIDFLIP_FFMPEG_PATH.")]
    FfmpegNotFound,

    #[error("Could not start FFmpeg: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("FFmpeg exited with code {exit_code}")]
    TranscodeFailed { exit_code: i32, stderr: String },

    #[error("FFmpeg did not finish within {timeout_secs}s and was terminated")]
    TranscodeTimeout { timeout_secs: u64, stderr: String },

    #[error("FFmpeg reported success but produced no output at {}", .path.display())]
    OutputMissing { path: PathBuf, stderr: String },

    #[error("Audio codec '{codec}' cannot be copied into a .{container} container")]
    IncompatibleAudioStream { codec: String, container: String },

    #[error("Workspace error while trying to {action} {}: {source}", .path.display())]
    WorkspaceIo {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlipError {
    pub fn workspace(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FlipError::WorkspaceIo {
            action,
            path: path.into(),
            source,
        }
    }

    /// Raw FFmpeg diagnostic text attached to transcode-related failures.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            FlipError::TranscodeFailed { stderr, .. }
            | FlipError::TranscodeTimeout { stderr, .. }
            | FlipError::OutputMissing { stderr, .. } => {
                Some(stderr.as_str()).filter(|s| !s.trim().is_empty())
            }
            _ => None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            FlipError::Cancelled => 130,
            FlipError::FfmpegNotFound => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_preserved_verbatim() {
        let err = FlipError::TranscodeFailed {
            exit_code: 1,
            stderr: "unsupported codec\n".to_string(),
        };
        assert_eq!(err.diagnostics(), Some("unsupported codec\n"));
    }

    #[test]
    fn test_diagnostics_absent_for_non_transcode_errors() {
        assert!(FlipError::InvalidSelection.diagnostics().is_none());
        let blank = FlipError::TranscodeTimeout {
            timeout_secs: 5,
            stderr: "  \n".to_string(),
        };
        assert!(blank.diagnostics().is_none());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FlipError::Cancelled.exit_code(), 130);
        assert_eq!(FlipError::FfmpegNotFound.exit_code(), 2);
        assert_eq!(FlipError::InvalidSelection.exit_code(), 1);
    }
}
