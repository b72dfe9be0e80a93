//! Progress reporting for jobs (bytes, files, speed, ETA).
//!
//! The scheduler publishes `ProgressSnapshot`s through a watch channel on the
//! job handle. `ProgressMeter` throttles ticks and keeps a smoothed speed
//! computed over the interval between ticks.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Pipeline stage a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Queued,
    Preflight,
    Downloading,
    Extracting,
    Copying,
    Verifying,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Preflight => "preflight",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Copying => "copying",
            Stage::Verifying => "verifying",
            Stage::Done => "done",
        }
    }
}

/// Snapshot of one job's progress.
///
/// Byte counters refer to the current stage. Extractors only report a
/// percentage, so while `Extracting` the byte counters stay at zero and
/// `percent` is set instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: Stage,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub files_done: usize,
    pub files_total: usize,
    /// Files left alone because the destination already had them.
    pub files_skipped: usize,
    pub percent: Option<u8>,
    pub current_file: Option<String>,
    /// Smoothed transfer rate in bytes per second.
    pub speed_bps: f64,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if let Some(pct) = self.percent {
            return f64::from(pct.min(100)) / 100.0;
        }
        if self.bytes_total == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.bytes_total as f64).min(1.0)
    }
}

/// Progress callback of an external stage (download, extraction): `(done, total)`.
/// `total` is 0 when unknown.
pub type StageProgress<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Estimated time remaining (None if the rate is 0 and work remains).
pub fn eta(remaining: u64, bytes_per_sec: f64) -> Option<Duration> {
    if remaining == 0 {
        return Some(Duration::ZERO);
    }
    if bytes_per_sec <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(remaining as f64 / bytes_per_sec))
}

/// Weight of the newest interval in the smoothed speed.
const SPEED_ALPHA: f64 = 0.3;

/// Throttles ticks to one per `interval` and tracks the speed.
#[derive(Debug)]
pub struct ProgressMeter {
    interval: Duration,
    started: Instant,
    last_emit: Option<Instant>,
    last_sample: Instant,
    last_bytes: u64,
    speed: f64,
    sampled: bool,
}

impl ProgressMeter {
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            started: now,
            last_emit: None,
            last_sample: now,
            last_bytes: 0,
            speed: 0.0,
            sampled: false,
        }
    }

    /// Bytes accounted for without being transferred (skipped files).
    /// They count towards progress but not towards speed.
    pub fn credit(&mut self, bytes: u64) {
        self.last_bytes = self.last_bytes.saturating_add(bytes);
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_emit
            .map_or(true, |t| now.duration_since(t) >= self.interval)
    }

    fn sample(&mut self, now: Instant, bytes_done: u64) {
        let dt = now.duration_since(self.last_sample).as_secs_f64();
        if dt <= 0.0 {
            return;
        }
        let delta = bytes_done.saturating_sub(self.last_bytes) as f64;
        let instant = delta / dt;
        self.speed = if self.sampled {
            SPEED_ALPHA * instant + (1.0 - SPEED_ALPHA) * self.speed
        } else {
            instant
        };
        self.sampled = true;
        self.last_sample = now;
        self.last_bytes = bytes_done;
    }

    /// Fill in speed, elapsed and ETA. Returns None when throttled, unless `force`.
    pub fn observe(&mut self, mut snap: ProgressSnapshot, force: bool) -> Option<ProgressSnapshot> {
        let now = Instant::now();
        if !force && !self.is_due(now) {
            return None;
        }
        self.sample(now, snap.bytes_done);
        self.last_emit = Some(now);
        snap.speed_bps = self.speed;
        snap.elapsed = now.duration_since(self.started);
        snap.eta = eta(snap.bytes_total.saturating_sub(snap.bytes_done), self.speed);
        Some(snap)
    }
}
