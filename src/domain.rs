use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FlipError, Result};

/// Which mirror transforms to apply to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlipSelection {
    pub horizontal: bool,
    pub vertical: bool,
}

impl FlipSelection {
    pub fn new(horizontal: bool, vertical: bool) -> Self {
        Self {
            horizontal,
            vertical,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.horizontal && !self.vertical
    }

    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            Err(FlipError::InvalidSelection)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for FlipSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.horizontal, self.vertical) {
            (true, true) => write!(f, "horizontal + vertical"),
            (true, false) => write!(f, "horizontal"),
            (false, true) => write!(f, "vertical"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// x264-style speed preset, ordered fastest to slowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeedPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    #[default]
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl SpeedPreset {
    pub const ALL: [SpeedPreset; 9] = [
        SpeedPreset::Ultrafast,
        SpeedPreset::Superfast,
        SpeedPreset::Veryfast,
        SpeedPreset::Faster,
        SpeedPreset::Fast,
        SpeedPreset::Medium,
        SpeedPreset::Slow,
        SpeedPreset::Slower,
        SpeedPreset::Veryslow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedPreset::Ultrafast => "ultrafast",
            SpeedPreset::Superfast => "superfast",
            SpeedPreset::Veryfast => "veryfast",
            SpeedPreset::Faster => "faster",
            SpeedPreset::Fast => "fast",
            SpeedPreset::Medium => "medium",
            SpeedPreset::Slow => "slow",
            SpeedPreset::Slower => "slower",
            SpeedPreset::Veryslow => "veryslow",
        }
    }
}

impl std::str::FromStr for SpeedPreset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| format!("Unknown preset: {}. Use ultrafast..veryslow", s))
    }
}

impl std::fmt::Display for SpeedPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output containers the flipper can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Mov,
    Mkv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Mov => "mov",
            OutputFormat::Mkv => "mkv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Mkv => "video/x-matroska",
        }
    }

    /// Whether an already-encoded audio stream can be remuxed into this container.
    pub fn accepts_audio_copy(&self, codec: &str) -> bool {
        match self {
            OutputFormat::Mkv => true,
            OutputFormat::Mp4 | OutputFormat::Mov => matches!(
                codec.to_lowercase().as_str(),
                "aac" | "mp3" | "ac3" | "eac3" | "alac" | "opus" | "flac"
            ),
        }
    }

    /// `-movflags +faststart` only means something for ISO-BMFF containers.
    pub fn supports_faststart(&self) -> bool {
        matches!(self, OutputFormat::Mp4 | OutputFormat::Mov)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp4" => Some(OutputFormat::Mp4),
            "mov" => Some(OutputFormat::Mov),
            "mkv" => Some(OutputFormat::Mkv),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| format!("Unknown format: {}. Supported: mp4, mov, mkv", s))
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// How the audio track is carried into the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum AudioMode {
    Encode { codec: String, bitrate_kbps: u32 },
    Copy,
}

impl Default for AudioMode {
    fn default() -> Self {
        AudioMode::Encode {
            codec: "aac".to_string(),
            bitrate_kbps: 192,
        }
    }
}

/// Encoder settings, fixed for a deployment and shared by every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    pub video_codec: String,
    /// CRF, 0 (lossless) to 51 (worst)
    pub quality: u8,
    pub preset: SpeedPreset,
    pub audio: AudioMode,
    pub faststart: bool,
    pub format: OutputFormat,
}

impl EncodingProfile {
    pub const MAX_QUALITY: u8 = 51;

    pub fn audio_passthrough(&self) -> bool {
        matches!(self.audio, AudioMode::Copy)
    }
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            quality: 17,
            preset: SpeedPreset::Fast,
            audio: AudioMode::default(),
            faststart: false,
            format: OutputFormat::Mp4,
        }
    }
}

/// Raw bytes handed over by the caller, as a browser form upload would be
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub declared_size: u64,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            declared_size: bytes.len() as u64,
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One flip request from submission until its workspace is released
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub selection: FlipSelection,
    pub profile: EncodingProfile,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    #[serde(skip)]
    pub diagnostic_log: String,
    pub duration_seconds: Option<f64>,
    pub progress_percent: u8,
    #[serde(skip)]
    pub timeout: Duration,
}

/// Exit status and captured diagnostics of a finished transcoder run
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub exit_code: i32,
    pub stderr_text: String,
    pub duration_seconds: Option<f64>,
}

/// Stream facts scraped from `ffmpeg -i`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration: Option<String>,
    pub duration_seconds: Option<f64>,
    pub dimensions: Option<(u32, u32)>,
    pub fps: Option<f32>,
    pub audio_codec: Option<String>,
}

/// A finished flip: the produced bytes plus what is needed to offer them for download
#[derive(Debug, Clone, Serialize)]
pub struct FlipResult {
    pub job_id: String,
    pub file_name: String,
    pub mime_type: &'static str,
    pub original_size: u64,
    pub output_size: u64,
    pub duration_seconds: Option<f64>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}
