//! Progress estimation from FFmpeg's stderr.
//!
//! FFmpeg's human-readable log is not a stable interface. Everything here is a
//! heuristic: lines that do not look like `Duration: HH:MM:SS.ff` or
//! `time=HH:MM:SS.ff` are skipped, and a missing duration only downgrades the
//! report to an indeterminate "processing" signal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::time::{Duration, Instant};

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration:\s*(?P<ts>\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("valid duration regex")
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=\s*(?P<ts>-?\d+:\d{2}:\d{2}(?:\.\d+)?)").expect("valid time regex")
});

/// Convert `HH:MM:SS(.fraction)` into seconds. A leading `-` negates the
/// whole timestamp, not just the hours.
pub fn timestamp_to_seconds(ts: &str) -> Option<f64> {
    let ts = ts.trim();
    let (sign, ts) = match ts.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, ts),
    };

    let parts: Vec<&str> = ts.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(sign * (hours * 3600.0 + minutes * 60.0 + seconds))
}

/// Pull the `Duration:` timestamp out of a block of probe output.
pub fn parse_duration(output: &str) -> Option<String> {
    DURATION_RE
        .captures(output)
        .map(|cap| cap["ts"].to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProgressEvent {
    /// Duration unknown, the transcoder is still working
    Processing,
    Percent { percent: u8 },
}

/// Per-job progress state. Create a fresh one for every transcoder run.
#[derive(Debug)]
pub struct ProgressEstimator {
    duration_seconds: Option<f64>,
    duration_from_stream: bool,
    percent: u8,
    indeterminate_reported: bool,
}

impl ProgressEstimator {
    pub fn new() -> Self {
        Self {
            duration_seconds: None,
            duration_from_stream: false,
            percent: 0,
            indeterminate_reported: false,
        }
    }

    /// Seed the duration from a prior probe. A `Duration:` line in the
    /// stream itself still wins if it appears first.
    pub fn with_duration_hint(mut self, seconds: Option<f64>) -> Self {
        self.duration_seconds = seconds.filter(|s| *s > 0.0);
        self
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Feed one diagnostic line. Returns an event when the line moved progress
    /// forward (or when the first indeterminate tick is due).
    pub fn observe_line(&mut self, line: &str) -> Option<ProgressEvent> {
        if !self.duration_from_stream {
            if let Some(cap) = DURATION_RE.captures(line) {
                self.duration_from_stream = true;
                if let Some(total) = timestamp_to_seconds(&cap["ts"]).filter(|s| *s > 0.0) {
                    self.duration_seconds = Some(total);
                }
                return None;
            }
        }

        let cap = TIME_RE.captures(line)?;
        let current = timestamp_to_seconds(&cap["ts"])?;

        let Some(total) = self.duration_seconds else {
            if self.indeterminate_reported {
                return None;
            }
            self.indeterminate_reported = true;
            return Some(ProgressEvent::Processing);
        };

        let raw = (100.0 * current / total).round().clamp(0.0, 100.0) as u8;
        if raw <= self.percent {
            return None;
        }

        self.percent = raw;
        Some(ProgressEvent::Percent { percent: raw })
    }

    /// Mark the run as complete. Always lands on exactly 100.
    pub fn finish(&mut self) -> ProgressEvent {
        self.percent = 100;
        ProgressEvent::Percent { percent: 100 }
    }
}

impl Default for ProgressEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Throughput and ETA derived from the percentage
#[derive(Debug, Clone)]
pub struct ProgressMetrics {
    start_time: Instant,
    pub elapsed_time: Duration,
    pub original_size: u64,
    pub current_progress: f64,
}

impl ProgressMetrics {
    pub fn new(original_size: u64) -> Self {
        Self {
            start_time: Instant::now(),
            elapsed_time: Duration::from_secs(0),
            original_size,
            current_progress: 0.0,
        }
    }

    /// Input bytes consumed per second, extrapolated from the percentage
    pub fn calculate_speed(&self) -> f64 {
        let elapsed_secs = self.elapsed_time.as_secs_f64();
        if elapsed_secs > 0.0 && self.current_progress > 0.0 {
            let bytes_processed = (self.original_size as f64 * self.current_progress) / 100.0;
            bytes_processed / elapsed_secs
        } else {
            0.0
        }
    }

    /// Estimated seconds remaining
    pub fn calculate_eta(&self) -> Option<f64> {
        if self.current_progress <= 0.0 || self.current_progress >= 100.0 {
            return None;
        }

        let speed = self.calculate_speed();
        if speed <= 0.0 {
            return None;
        }

        let remaining_bytes = self.original_size as f64 * (100.0 - self.current_progress) / 100.0;
        Some(remaining_bytes / speed)
    }

    pub fn update_progress(&mut self, progress: f64) {
        self.current_progress = progress.clamp(0.0, 100.0);
        self.elapsed_time = self.start_time.elapsed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const HEADER: &str = "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s";

    fn stats(ts: &str) -> String {
        format!("frame=  120 fps= 60 q=23.0 size=     256kB time={ts} bitrate= 400.0kbits/s speed=2.01x")
    }

    #[test]
    fn test_timestamp_to_seconds() {
        assert_eq!(timestamp_to_seconds("00:00:02.50"), Some(2.5));
        assert_eq!(timestamp_to_seconds("01:02:03.00"), Some(3723.0));
        assert_eq!(timestamp_to_seconds("garbage"), None);
        assert_eq!(timestamp_to_seconds("00:10"), None);
        assert_eq!(timestamp_to_seconds("-00:00:00.50"), Some(-0.5));
    }

    #[test]
    fn test_negative_start_time_reports_nothing() {
        let mut est = ProgressEstimator::new().with_duration_hint(Some(1.0));
        assert_eq!(est.observe_line("frame=0 time=-00:00:00.50 bitrate=N/A"), None);
        assert_eq!(est.percent(), 0);
        assert_eq!(
            est.observe_line("frame=5 time=00:00:00.25 bitrate=N/A"),
            Some(ProgressEvent::Percent { percent: 25 })
        );
    }

    #[test]
    fn test_parse_duration_from_probe_block() {
        let block = format!("Input #0, mov,mp4\n{HEADER}\n  Stream #0:0");
        assert_eq!(parse_duration(&block).as_deref(), Some("00:00:10.00"));
        assert_eq!(parse_duration("nothing here"), None);
    }

    #[test]
    fn test_percent_follows_time() {
        let mut est = ProgressEstimator::new();
        assert_eq!(est.observe_line(HEADER), None);
        assert_eq!(est.duration_seconds(), Some(10.0));
        assert_eq!(
            est.observe_line(&stats("00:00:02.50")),
            Some(ProgressEvent::Percent { percent: 25 })
        );
        assert_eq!(
            est.observe_line(&stats("00:00:05.00")),
            Some(ProgressEvent::Percent { percent: 50 })
        );
    }

    #[test]
    fn test_percent_never_decreases() {
        let mut est = ProgressEstimator::new();
        est.observe_line(HEADER);
        est.observe_line(&stats("00:00:06.00"));
        assert_eq!(est.observe_line(&stats("00:00:03.00")), None);
        assert_eq!(est.percent(), 60);
    }

    #[test]
    fn test_overshoot_is_clamped() {
        let mut est = ProgressEstimator::new();
        est.observe_line(HEADER);
        assert_eq!(
            est.observe_line(&stats("00:00:12.00")),
            Some(ProgressEvent::Percent { percent: 100 })
        );
    }

    #[test]
    fn test_finish_always_reaches_hundred() {
        let mut est = ProgressEstimator::new();
        est.observe_line(HEADER);
        est.observe_line(&stats("00:00:09.00"));
        assert_eq!(est.finish(), ProgressEvent::Percent { percent: 100 });
        assert_eq!(est.percent(), 100);
    }

    #[test]
    fn test_only_first_duration_counts() {
        let mut est = ProgressEstimator::new();
        est.observe_line(HEADER);
        est.observe_line("  Duration: 00:01:40.00, start: 0.000000");
        assert_eq!(est.duration_seconds(), Some(10.0));
    }

    #[test]
    fn test_missing_duration_is_indeterminate() {
        let mut est = ProgressEstimator::new();
        assert_eq!(
            est.observe_line(&stats("00:00:01.00")),
            Some(ProgressEvent::Processing)
        );
        assert_eq!(est.observe_line(&stats("00:00:02.00")), None);
        assert_eq!(est.percent(), 0);
    }

    #[test]
    fn test_duration_hint_used_when_stream_lacks_header() {
        let mut est = ProgressEstimator::new().with_duration_hint(Some(4.0));
        assert_eq!(
            est.observe_line(&stats("00:00:01.00")),
            Some(ProgressEvent::Percent { percent: 25 })
        );
    }

    #[test]
    fn test_stream_duration_overrides_hint() {
        let mut est = ProgressEstimator::new().with_duration_hint(Some(4.0));
        est.observe_line(HEADER);
        assert_eq!(est.duration_seconds(), Some(10.0));
    }

    #[test]
    fn test_unrelated_lines_ignored() {
        let mut est = ProgressEstimator::new();
        est.observe_line(HEADER);
        assert_eq!(est.observe_line("Press [q] to stop, [?] for help"), None);
        assert_eq!(est.observe_line("time=N/A bitrate=N/A"), None);
        assert_eq!(est.observe_line(""), None);
    }

    #[test]
    fn test_metrics_eta() {
        let mut metrics = ProgressMetrics::new(1_000_000);
        assert!(metrics.calculate_eta().is_none());
        thread::sleep(Duration::from_millis(50));
        metrics.update_progress(50.0);
        assert!(metrics.calculate_speed() > 0.0);
        assert!(metrics.calculate_eta().unwrap() > 0.0);
        metrics.update_progress(150.0);
        assert_eq!(metrics.current_progress, 100.0);
        assert!(metrics.calculate_eta().is_none());
    }
}
