use crossbeam_channel::RecvTimeoutError;
use once_cell::sync::Lazy;
use regex::Regex;
use shared_child::SharedChild;
use std::{
    io::{BufReader, Read},
    path::Path,
    process::{Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::domain::{AudioMode, EncodingProfile, Job, TranscodeResult, VideoInfo};
use crate::error::{FlipError, Result};
use crate::filter::build_filter;
use crate::progress::{parse_duration, timestamp_to_seconds};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound for reading stream facts; a probe never needs a full transcode budget
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

static DIMENSIONS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Video:.*? (\d{2,5})x(\d{2,5})").expect("valid dimensions regex"));
static FPS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*fps").expect("valid fps regex"));
static AUDIO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Audio:\s*([A-Za-z0-9_]+)").expect("valid audio regex"));

/// The seam between the job pipeline and the external transcoder
pub trait Transcoder {
    /// Scrape stream facts from the input without transcoding it. Bounded by
    /// `timeout` and `cancelled` like a transcode run.
    fn probe(&self, input: &Path, timeout: Duration, cancelled: &AtomicBool) -> Result<VideoInfo>;

    /// Run one job to completion, handing every diagnostic line to `on_line`
    /// as it arrives.
    fn run(
        &self,
        job: &Job,
        cancelled: &AtomicBool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<TranscodeResult>;
}

/// Kills and reaps the child unless disarmed, so no exit path leaves a
/// running or zombie FFmpeg behind.
struct ChildGuard {
    child: Arc<SharedChild>,
    armed: bool,
}

impl ChildGuard {
    fn new(child: Arc<SharedChild>) -> Self {
        Self { child, armed: true }
    }

    fn terminate(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "ffmpeg kill failed, it may have exited already");
        }
        if let Err(e) = self.child.wait() {
            tracing::warn!(error = %e, "failed to reap ffmpeg process");
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// FFmpeg wrapper for flipping videos
pub struct FFmpeg {
    ffmpeg_path: String,
}

impl FFmpeg {
    /// Locate FFmpeg on this host
    pub fn new() -> Result<Self> {
        Self::find_ffmpeg().map(Self::with_binary)
    }

    /// Use an explicit binary without any lookup
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.ffmpeg_path
    }

    /// Find the FFmpeg binary.
    ///
    /// Search order:
    /// 1. `VIDFLIP_FFMPEG_PATH` environment variable
    /// 2. `ffmpeg` next to the vidflip executable
    /// 3. `PATH`
    fn find_ffmpeg() -> Result<String> {
        if let Ok(explicit_path) = std::env::var("VIDFLIP_FFMPEG_PATH") {
            let path = Path::new(&explicit_path);
            if path.is_file() {
                tracing::info!(path = %explicit_path, "using ffmpeg from VIDFLIP_FFMPEG_PATH");
                return Ok(explicit_path);
            }
            tracing::warn!(path = %explicit_path, "VIDFLIP_FFMPEG_PATH is set but is not a file");
            return Err(FlipError::FfmpegNotFound);
        }

        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        if let Some(dir) = exe_dir {
            let bundled = if cfg!(windows) {
                dir.join("ffmpeg.exe")
            } else {
                dir.join("ffmpeg")
            };

            if bundled.is_file() {
                let bundled_path = bundled.to_string_lossy().to_string();
                tracing::info!(path = %bundled_path, "using bundled ffmpeg");
                return Ok(bundled_path);
            }
        }

        if let Ok(path) = which::which("ffmpeg") {
            let path_str = path.to_string_lossy().to_string();
            tracing::debug!(path = %path_str, "using ffmpeg from PATH");
            return Ok(path_str);
        }

        Err(FlipError::FfmpegNotFound)
    }

    /// Reduce file paths in an argument vector to their file names
    fn sanitize_args_for_logging(args: &[String]) -> Vec<String> {
        args.iter()
            .map(|arg| {
                if !arg.starts_with('-') && (arg.contains('/') || arg.contains('\\')) {
                    Path::new(arg)
                        .file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_else(|| arg.clone())
                } else {
                    arg.clone()
                }
            })
            .collect()
    }

    fn parse_video_info(output: &str) -> VideoInfo {
        let duration = parse_duration(output);
        let duration_seconds = duration.as_deref().and_then(timestamp_to_seconds);

        let dimensions = DIMENSIONS_RE.captures(output).and_then(|cap| {
            let width = cap.get(1)?.as_str().parse().ok()?;
            let height = cap.get(2)?.as_str().parse().ok()?;
            Some((width, height))
        });

        let fps = FPS_RE
            .captures(output)
            .and_then(|cap| cap.get(1)?.as_str().parse().ok());

        let audio_codec = AUDIO_RE
            .captures(output)
            .map(|cap| cap[1].to_lowercase());

        VideoInfo {
            duration,
            duration_seconds,
            dimensions,
            fps,
            audio_codec,
        }
    }
}

impl FFmpeg {
    /// Spawn FFmpeg with `args` and wait for it, streaming stderr lines to
    /// `on_line`. The child is killed and reaped on cancellation, on timeout,
    /// and on any early return.
    fn supervise(
        &self,
        label: &str,
        args: &[String],
        timeout: Duration,
        cancelled: &AtomicBool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(ExitStatus, String)> {
        tracing::debug!(
            job = %label,
            args = %Self::sanitize_args_for_logging(args).join(" "),
            "spawning ffmpeg"
        );

        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let child = Arc::new(SharedChild::spawn(&mut command).map_err(FlipError::SpawnFailed)?);
        let mut guard = ChildGuard::new(child.clone());

        let (tx, rx) = crossbeam_channel::unbounded::<String>();
        if let Some(stderr) = child.take_stderr() {
            std::thread::spawn(move || {
                read_diagnostic_lines(stderr, |line| tx.send(line.to_string()).is_ok());
            });
        }

        let started = Instant::now();
        let mut log = String::new();

        let status = loop {
            if cancelled.load(Ordering::Relaxed) {
                tracing::info!(job = %label, "cancelled, terminating ffmpeg");
                guard.terminate();
                return Err(FlipError::Cancelled);
            }

            if started.elapsed() >= timeout {
                tracing::warn!(job = %label, timeout = ?timeout, "ffmpeg timed out, terminating");
                guard.terminate();
                while let Ok(line) = rx.try_recv() {
                    record_line(&mut log, &line, on_line);
                }
                return Err(FlipError::TranscodeTimeout {
                    timeout_secs: timeout.as_secs(),
                    stderr: log,
                });
            }

            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => record_line(&mut log, &line, on_line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            }

            if let Some(status) = child.try_wait()? {
                break status;
            }
        };
        guard.disarm();

        // Lines still buffered in the pipe belong to this run
        let drain_deadline = Instant::now() + DRAIN_GRACE;
        loop {
            let remaining = drain_deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) => record_line(&mut log, &line, on_line),
                Err(_) => break,
            }
        }

        tracing::debug!(
            job = %label,
            exit_code = ?status.code(),
            elapsed = ?started.elapsed(),
            "ffmpeg exited"
        );
        Ok((status, log))
    }
}

impl Transcoder for FFmpeg {
    /// `ffmpeg -i` without an output always exits non-zero; the stream
    /// description on stderr is what matters.
    fn probe(&self, input: &Path, timeout: Duration, cancelled: &AtomicBool) -> Result<VideoInfo> {
        let args = vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ];
        let (_, stderr) = self.supervise("probe", &args, timeout, cancelled, &mut |_| {})?;

        if stderr.contains("Invalid data found when processing input") {
            return Err(FlipError::InvalidInput(format!(
                "{} is not a readable video",
                input.display()
            )));
        }

        Ok(Self::parse_video_info(&stderr))
    }

    fn run(
        &self,
        job: &Job,
        cancelled: &AtomicBool,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<TranscodeResult> {
        let filter = build_filter(&job.selection)?;
        let args = build_args(&job.profile, &filter, &job.input_path, &job.output_path);

        let (status, log) = self.supervise(&job.id, &args, job.timeout, cancelled, on_line)?;
        let exit_code = status.code().unwrap_or(-1);

        if !status.success() {
            return Err(FlipError::TranscodeFailed {
                exit_code,
                stderr: log,
            });
        }

        let produced = std::fs::metadata(&job.output_path)
            .map(|m| m.len())
            .unwrap_or(0);
        if produced == 0 {
            return Err(FlipError::OutputMissing {
                path: job.output_path.clone(),
                stderr: log,
            });
        }

        let duration_seconds = parse_duration(&log).as_deref().and_then(timestamp_to_seconds);

        Ok(TranscodeResult {
            exit_code,
            stderr_text: log,
            duration_seconds,
        })
    }
}

fn record_line(log: &mut String, line: &str, on_line: &mut dyn FnMut(&str)) {
    on_line(line);
    log.push_str(line);
    log.push('\n');
}

/// Build the transcoder argument vector:
/// `-y -i <in> -vf <filter> -c:v <codec> -crf <q> -preset <p> -c:a <codec|copy> [-b:a <k>] [-movflags +faststart] <out>`
pub fn build_args(
    profile: &EncodingProfile,
    filter: &str,
    input_path: &Path,
    output_path: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-y".to_string(),
        "-i".to_string(),
        input_path.to_string_lossy().to_string(),
        "-vf".to_string(),
        filter.to_string(),
        "-c:v".to_string(),
        profile.video_codec.clone(),
        "-crf".to_string(),
        profile.quality.min(EncodingProfile::MAX_QUALITY).to_string(),
        "-preset".to_string(),
        profile.preset.as_str().to_string(),
    ];

    match &profile.audio {
        AudioMode::Encode {
            codec,
            bitrate_kbps,
        } => {
            args.extend([
                "-c:a".to_string(),
                codec.clone(),
                "-b:a".to_string(),
                format!("{}k", bitrate_kbps),
            ]);
        }
        AudioMode::Copy => {
            args.extend(["-c:a".to_string(), "copy".to_string()]);
        }
    }

    if profile.faststart && profile.format.supports_faststart() {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.push(output_path.to_string_lossy().to_string());
    args
}

/// Reject audio passthrough when the source track cannot live in the target container.
pub fn check_audio_passthrough(profile: &EncodingProfile, info: &VideoInfo) -> Result<()> {
    if !profile.audio_passthrough() {
        return Ok(());
    }

    match info.audio_codec.as_deref() {
        Some(codec) if !profile.format.accepts_audio_copy(codec) => {
            Err(FlipError::IncompatibleAudioStream {
                codec: codec.to_string(),
                container: profile.format.extension().to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Split a diagnostic stream on `\n` and `\r`. FFmpeg redraws its stats line
/// with carriage returns, so newline-only splitting would hold every
/// `time=` update back until the process exits.
fn read_diagnostic_lines<R: Read>(reader: R, mut emit: impl FnMut(&str) -> bool) {
    let mut line: Vec<u8> = Vec::with_capacity(256);

    for byte in BufReader::new(reader).bytes() {
        let Ok(byte) = byte else { break };
        if byte == b'\n' || byte == b'\r' {
            if !line.is_empty() {
                if !emit(&String::from_utf8_lossy(&line)) {
                    return;
                }
                line.clear();
            }
        } else {
            line.push(byte);
        }
    }

    if !line.is_empty() {
        emit(&String::from_utf8_lossy(&line));
    }
}
