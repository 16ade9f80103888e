use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use crate::domain::{EncodingProfile, FlipResult, FlipSelection, Job, JobStatus, Upload};
use crate::error::{FlipError, Result};
use crate::ffmpeg::{check_audio_passthrough, Transcoder, PROBE_TIMEOUT};
use crate::progress::{ProgressEstimator, ProgressEvent};
use crate::sink;
use crate::workspace::{self, JobWorkspace};

const MB: u64 = 1024 * 1024;

/// Wall-clock budget for one transcoder run, scaled by upload size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub base: Duration,
    pub per_megabyte: Duration,
    pub max: Duration,
    /// Fixed budget that ignores the size entirely
    pub fixed: Option<Duration>,
}

impl TimeoutPolicy {
    pub fn fixed(timeout: Duration) -> Self {
        Self {
            fixed: Some(timeout),
            ..Self::default()
        }
    }

    pub fn for_size(&self, bytes: u64) -> Duration {
        if let Some(fixed) = self.fixed {
            return fixed;
        }
        let megabytes = bytes / MB + u64::from(bytes % MB != 0);
        let megabytes = u32::try_from(megabytes).unwrap_or(u32::MAX);
        self.base
            .saturating_add(self.per_megabyte.saturating_mul(megabytes))
            .min(self.max)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5 * 60),
            per_megabyte: Duration::from_secs(2),
            max: Duration::from_secs(2 * 60 * 60),
            fixed: None,
        }
    }
}

/// Deployment-level knobs that apply to every submitted job
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub workspace_root: PathBuf,
    /// Uploads above this many bytes are refused; `None` disables the check
    pub max_upload_bytes: Option<u64>,
    pub timeout: TimeoutPolicy,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            workspace_root: workspace::default_root(),
            max_upload_bytes: Some(200 * MB),
            timeout: TimeoutPolicy::default(),
        }
    }
}

/// Refuse an upload before any of it touches the disk.
pub fn check_upload(upload: &Upload, settings: &JobSettings) -> Result<()> {
    let size = upload.declared_size.max(upload.bytes.len() as u64);
    if let Some(limit) = settings.max_upload_bytes {
        if size > limit {
            return Err(FlipError::UploadTooLarge { size, limit });
        }
    }
    if upload.bytes.is_empty() {
        return Err(FlipError::InvalidInput(format!(
            "{} is empty",
            upload.file_name
        )));
    }
    Ok(())
}

/// Flip one uploaded video.
///
/// Validates the request, stores the upload in a fresh workspace, runs the
/// transcoder while feeding progress events to `on_progress`, and returns the
/// produced bytes. The workspace is gone by the time this returns, whatever
/// the outcome.
pub fn submit<T, F>(
    transcoder: &T,
    upload: &Upload,
    selection: FlipSelection,
    profile: &EncodingProfile,
    settings: &JobSettings,
    cancelled: &AtomicBool,
    mut on_progress: F,
) -> Result<FlipResult>
where
    T: Transcoder + ?Sized,
    F: FnMut(ProgressEvent),
{
    selection.ensure_not_empty()?;
    check_upload(upload, settings)?;

    let workspace = JobWorkspace::acquire(&settings.workspace_root, &upload.file_name, profile.format)?;
    workspace.write_input(&upload.bytes)?;

    let original_size = upload.bytes.len() as u64;
    let timeout = settings.timeout.for_size(original_size);

    let info = transcoder.probe(workspace.input_path(), timeout.min(PROBE_TIMEOUT), cancelled)?;
    check_audio_passthrough(profile, &info)?;

    let mut job = Job {
        id: workspace.id().to_string(),
        input_path: workspace.input_path().to_path_buf(),
        output_path: workspace.output_path().to_path_buf(),
        selection,
        profile: profile.clone(),
        status: JobStatus::Pending,
        exit_code: None,
        diagnostic_log: String::new(),
        duration_seconds: info.duration_seconds,
        progress_percent: 0,
        timeout,
    };

    let mut estimator = ProgressEstimator::new().with_duration_hint(info.duration_seconds);

    job.status = JobStatus::Running;
    tracing::info!(
        job = %job.id,
        file = %upload.file_name,
        selection = %selection,
        dir = %workspace.dir().display(),
        "job started"
    );

    let outcome = transcoder.run(&job, cancelled, &mut |line| {
        if let Some(event) = estimator.observe_line(line) {
            on_progress(event);
        }
    });

    let transcoded = match outcome {
        Ok(result) => result,
        Err(e) => {
            job.status = JobStatus::Failed;
            if let FlipError::TranscodeFailed { exit_code, .. } = &e {
                job.exit_code = Some(*exit_code);
            }
            tracing::info!(job = %job.id, status = ?job.status, error = %e, "job failed");
            workspace.release();
            return Err(e);
        }
    };

    job.exit_code = Some(transcoded.exit_code);
    job.duration_seconds = estimator.duration_seconds().or(transcoded.duration_seconds);
    job.diagnostic_log = transcoded.stderr_text;

    let bytes = sink::expose(&workspace)?;
    workspace.release();

    // Only report completion once the output is actually in hand
    on_progress(estimator.finish());

    job.status = JobStatus::Succeeded;
    job.progress_percent = estimator.percent();
    tracing::info!(job = %job.id, output_size = bytes.len(), "job succeeded");
    tracing::trace!(job = %job.id, log = %job.diagnostic_log, "ffmpeg diagnostics");

    Ok(FlipResult {
        job_id: job.id,
        file_name: sink::suggested_file_name(&upload.file_name, profile.format),
        mime_type: profile.format.mime_type(),
        original_size,
        output_size: bytes.len() as u64,
        duration_seconds: job.duration_seconds,
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AudioMode, TranscodeResult, VideoInfo};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Records calls and plays back a scripted transcoder outcome
    struct SpyTranscoder {
        probes: AtomicUsize,
        runs: AtomicUsize,
        info: VideoInfo,
        lines: Vec<&'static str>,
        fail_with: Option<(i32, &'static str)>,
        write_output: bool,
    }

    impl SpyTranscoder {
        fn succeeding(lines: Vec<&'static str>) -> Self {
            Self {
                probes: AtomicUsize::new(0),
                runs: AtomicUsize::new(0),
                info: VideoInfo::default(),
                lines,
                fail_with: None,
                write_output: true,
            }
        }

        fn failing(exit_code: i32, stderr: &'static str) -> Self {
            Self {
                fail_with: Some((exit_code, stderr)),
                ..Self::succeeding(Vec::new())
            }
        }

        fn calls(&self) -> usize {
            self.probes.load(Ordering::SeqCst) + self.runs.load(Ordering::SeqCst)
        }
    }

    impl Transcoder for SpyTranscoder {
        fn probe(
            &self,
            _input: &Path,
            _timeout: Duration,
            _cancelled: &AtomicBool,
        ) -> Result<VideoInfo> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Ok(self.info.clone())
        }

        fn run(
            &self,
            job: &Job,
            _cancelled: &AtomicBool,
            on_line: &mut dyn FnMut(&str),
        ) -> Result<TranscodeResult> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            for line in &self.lines {
                on_line(line);
            }
            if let Some((exit_code, stderr)) = self.fail_with {
                return Err(FlipError::TranscodeFailed {
                    exit_code,
                    stderr: stderr.to_string(),
                });
            }
            // Echo the input so callers can tell jobs apart
            if self.write_output {
                let input = fs::read(&job.input_path)?;
                fs::write(&job.output_path, [b"flipped:".as_slice(), &input].concat())?;
            }
            Ok(TranscodeResult {
                exit_code: 0,
                stderr_text: self.lines.join("\n"),
                duration_seconds: None,
            })
        }
    }

    fn settings(root: &Path) -> JobSettings {
        JobSettings {
            workspace_root: root.to_path_buf(),
            max_upload_bytes: Some(1024),
            timeout: TimeoutPolicy::fixed(Duration::from_secs(30)),
        }
    }

    fn job_dirs(root: &Path) -> usize {
        fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_empty_selection_never_reaches_transcoder() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::succeeding(Vec::new());
        let upload = Upload::new("clip.mp4", b"video".to_vec());

        let err = submit(
            &spy,
            &upload,
            FlipSelection::default(),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, FlipError::InvalidSelection));
        assert_eq!(spy.calls(), 0);
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_oversized_upload_rejected_before_disk() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::succeeding(Vec::new());
        let upload = Upload::new("big.mp4", vec![0u8; 2048]);

        let err = submit(
            &spy,
            &upload,
            FlipSelection::new(true, false),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, FlipError::UploadTooLarge { size: 2048, limit: 1024 }));
        assert_eq!(spy.calls(), 0);
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_declared_size_counts_toward_limit() {
        let upload = Upload {
            file_name: "a.mp4".to_string(),
            declared_size: 4096,
            bytes: vec![1, 2, 3],
        };
        let root = TempDir::new().unwrap();
        assert!(matches!(
            check_upload(&upload, &settings(root.path())),
            Err(FlipError::UploadTooLarge { .. })
        ));
    }

    #[test]
    fn test_success_reports_monotonic_progress_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::succeeding(vec![
            "  Duration: 00:00:02.00, start: 0.000000, bitrate: 100 kb/s",
            "frame=10 time=00:00:01.00 bitrate=1.0",
            "frame=5 time=00:00:00.50 bitrate=1.0",
            "frame=19 time=00:00:01.90 bitrate=1.0",
        ]);
        let upload = Upload::new("holiday.mov", b"frames".to_vec());

        let mut events = Vec::new();
        let result = submit(
            &spy,
            &upload,
            FlipSelection::new(true, false),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |event| events.push(event),
        )
        .unwrap();

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Percent { percent } => Some(*percent),
                ProgressEvent::Processing => None,
            })
            .collect();
        assert_eq!(percents, vec![50, 95, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));

        assert_eq!(result.bytes, b"flipped:frames");
        assert_eq!(result.file_name, "holiday_flipped.mp4");
        assert_eq!(result.mime_type, "video/mp4");
        assert_eq!(result.duration_seconds, Some(2.0));
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_indeterminate_progress_still_finishes_at_hundred() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::succeeding(vec!["frame=1 time=00:00:00.40 bitrate=1.0"]);
        let upload = Upload::new("clip.mp4", b"x".to_vec());

        let mut events = Vec::new();
        submit(
            &spy,
            &upload,
            FlipSelection::new(false, true),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |event| events.push(event),
        )
        .unwrap();

        assert_eq!(
            events,
            vec![ProgressEvent::Processing, ProgressEvent::Percent { percent: 100 }]
        );
    }

    #[test]
    fn test_transcode_failure_surfaces_stderr_and_cleans_up() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::failing(1, "unsupported codec");
        let upload = Upload::new("clip.mp4", b"x".to_vec());

        let err = submit(
            &spy,
            &upload,
            FlipSelection::new(true, true),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert_eq!(err.diagnostics(), Some("unsupported codec"));
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_incompatible_passthrough_rejected_before_run() {
        let root = TempDir::new().unwrap();
        let mut spy = SpyTranscoder::succeeding(Vec::new());
        spy.info.audio_codec = Some("vorbis".to_string());
        let profile = EncodingProfile {
            audio: AudioMode::Copy,
            ..EncodingProfile::default()
        };
        let upload = Upload::new("clip.webm", b"x".to_vec());

        let err = submit(
            &spy,
            &upload,
            FlipSelection::new(true, false),
            &profile,
            &settings(root.path()),
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, FlipError::IncompatibleAudioStream { .. }));
        assert_eq!(spy.runs.load(Ordering::SeqCst), 0);
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_concurrent_sessions_with_same_name_do_not_collide() {
        let root = TempDir::new().unwrap();
        let spy = SpyTranscoder::succeeding(Vec::new());
        let settings = settings(root.path());

        let results: Vec<FlipResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["first", "second"]
                .into_iter()
                .map(|payload| {
                    let spy = &spy;
                    let settings = &settings;
                    scope.spawn(move || {
                        let upload = Upload::new("same.mp4", payload.as_bytes().to_vec());
                        submit(
                            spy,
                            &upload,
                            FlipSelection::new(true, false),
                            &EncodingProfile::default(),
                            settings,
                            &AtomicBool::new(false),
                            |_| {},
                        )
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results[0].bytes, b"flipped:first");
        assert_eq!(results[1].bytes, b"flipped:second");
        assert_ne!(results[0].job_id, results[1].job_id);
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_timeout_policy_scales_with_size() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.for_size(0), Duration::from_secs(300));
        assert_eq!(policy.for_size(10 * MB), Duration::from_secs(320));
        assert_eq!(policy.for_size(u64::MAX), Duration::from_secs(7200));
        assert_eq!(
            TimeoutPolicy::fixed(Duration::from_secs(3)).for_size(500 * MB),
            Duration::from_secs(3)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_end_to_end_with_process_stand_in() {
        let root = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let body = r#"case "$1" in
  -hide_banner) printf '  Duration: 00:00:02.00, start: 0.000000\n' >&2; exit 1 ;;
esac
for last; do :; done
printf 'frame=1 time=00:00:01.00 bitrate=1.0\r' >&2
cat "$3" > "$last""#;
        let ffmpeg = crate::testutil::fake_ffmpeg(bin_dir.path(), body);
        let settings = settings(root.path());

        let results: Vec<FlipResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["session-a", "session-b"]
                .into_iter()
                .map(|payload| {
                    let ffmpeg = &ffmpeg;
                    let settings = &settings;
                    scope.spawn(move || {
                        let upload = Upload::new("clip.mp4", payload.as_bytes().to_vec());
                        let mut last = 0;
                        let result = submit(
                            ffmpeg,
                            &upload,
                            FlipSelection::new(true, false),
                            &EncodingProfile::default(),
                            settings,
                            &AtomicBool::new(false),
                            |event| {
                                if let ProgressEvent::Percent { percent } = event {
                                    assert!(percent >= last);
                                    last = percent;
                                }
                            },
                        )
                        .unwrap();
                        assert_eq!(last, 100);
                        result
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results[0].bytes, b"session-a");
        assert_eq!(results[1].bytes, b"session-b");
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[test]
    fn test_no_completion_event_when_output_cannot_be_read() {
        let root = TempDir::new().unwrap();
        let mut spy = SpyTranscoder::succeeding(vec![
            "  Duration: 00:00:02.00, start: 0.000000",
            "frame=10 time=00:00:01.00 bitrate=1.0",
        ]);
        spy.write_output = false;
        let upload = Upload::new("clip.mp4", b"x".to_vec());

        let mut events = Vec::new();
        let err = submit(
            &spy,
            &upload,
            FlipSelection::new(true, false),
            &EncodingProfile::default(),
            &settings(root.path()),
            &AtomicBool::new(false),
            |event| events.push(event),
        )
        .unwrap_err();

        assert!(matches!(err, FlipError::WorkspaceIo { action: "read", .. }));
        assert_eq!(events, vec![ProgressEvent::Percent { percent: 50 }]);
        assert_eq!(job_dirs(root.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_stuck_probe_bounded_by_timeout() {
        let root = TempDir::new().unwrap();
        let bin_dir = TempDir::new().unwrap();
        let body = r#"case "$1" in
  -hide_banner) exec sleep 30 ;;
esac
exit 1"#;
        let ffmpeg = crate::testutil::fake_ffmpeg(bin_dir.path(), body);
        let settings = JobSettings {
            timeout: TimeoutPolicy::fixed(Duration::from_secs(1)),
            ..settings(root.path())
        };
        let upload = Upload::new("clip.mp4", b"x".to_vec());

        let started = std::time::Instant::now();
        let err = submit(
            &ffmpeg,
            &upload,
            FlipSelection::new(true, false),
            &EncodingProfile::default(),
            &settings,
            &AtomicBool::new(false),
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, FlipError::TranscodeTimeout { timeout_secs: 1, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(job_dirs(root.path()), 0);
    }

    /// Decode the first frame of `path` as packed RGB, optionally through `filter`
    fn first_frame(ffmpeg: &Path, path: &Path, filter: Option<&str>) -> Vec<u8> {
        let mut command = std::process::Command::new(ffmpeg);
        command.args(["-v", "error", "-i"]).arg(path);
        if let Some(filter) = filter {
            command.args(["-vf", filter]);
        }
        let output = command
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .output()
            .unwrap();
        assert!(output.status.success(), "frame decode failed");
        output.stdout
    }

    fn mean_abs_diff(a: &[u8], b: &[u8]) -> f64 {
        assert_eq!(a.len(), b.len());
        let total: u64 = a
            .iter()
            .zip(b)
            .map(|(x, y)| u64::from(x.abs_diff(*y)))
            .sum();
        total as f64 / a.len() as f64
    }

    #[test]
    fn test_real_ffmpeg_horizontal_flip_is_repeatable() {
        let Ok(binary) = which::which("ffmpeg") else {
            eprintln!("ffmpeg not on PATH, skipping");
            return;
        };
        let ffmpeg = crate::ffmpeg::FFmpeg::with_binary(binary.to_string_lossy().to_string());
        let scratch = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();

        let source = scratch.path().join("source.mp4");
        let generated = std::process::Command::new(&binary)
            .args([
                "-v",
                "error",
                "-y",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=2:size=160x120:rate=10",
                "-pix_fmt",
                "yuv420p",
            ])
            .arg(&source)
            .status()
            .unwrap();
        assert!(generated.success());

        let never = AtomicBool::new(false);
        let source_info = ffmpeg.probe(&source, PROBE_TIMEOUT, &never).unwrap();
        let source_duration = source_info.duration_seconds.unwrap();

        let upload = Upload::new("source.mp4", fs::read(&source).unwrap());
        let settings = JobSettings {
            max_upload_bytes: None,
            ..settings(root.path())
        };

        let mut outputs = Vec::new();
        for round in 0..2 {
            let result = submit(
                &ffmpeg,
                &upload,
                FlipSelection::new(true, false),
                &EncodingProfile::default(),
                &settings,
                &never,
                |_| {},
            )
            .unwrap();

            let path = scratch.path().join(format!("flipped-{round}.mp4"));
            fs::write(&path, &result.bytes).unwrap();

            let info = ffmpeg.probe(&path, PROBE_TIMEOUT, &never).unwrap();
            assert_eq!(info.dimensions, source_info.dimensions);
            assert!((info.duration_seconds.unwrap() - source_duration).abs() < 0.2);
            outputs.push(path);
        }
        assert_eq!(job_dirs(root.path()), 0);

        let mirrored = first_frame(&binary, &source, Some("hflip"));
        let plain = first_frame(&binary, &source, None);
        let first = first_frame(&binary, &outputs[0], None);
        let second = first_frame(&binary, &outputs[1], None);

        assert!(mean_abs_diff(&first, &mirrored) < mean_abs_diff(&first, &plain));
        assert!(mean_abs_diff(&first, &second) < 1.0);
    }
}
