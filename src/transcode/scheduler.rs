//! Progress-gated segment scheduling.
//!
//! The scheduler walks segment indices in order. A segment is cut only once
//! the transfer has downloaded enough of the file to cover it plus a safety
//! margin; failed attempts are retried after a cooldown until the retry
//! budget runs out, at which point the segment is abandoned and the cursor
//! moves on. Once the transfer is seeding the runner switches to drain mode,
//! which drops the progress gate.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::store::SegmentStore;
use super::worker::{segment_path, TranscodeWorker};
use crate::config::TranscodeConfig;

/// Retry budget for a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before a segment is abandoned.
    pub max_retries: u32,
    /// Minimum spacing between attempts of the same segment.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub segment_duration: f64,
    pub safety_margin_pct: f64,
    pub retry: RetryPolicy,
    pub duration_probe_interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            segment_duration: 10.0,
            safety_margin_pct: 5.0,
            retry: RetryPolicy::default(),
            duration_probe_interval: Duration::from_secs(2),
        }
    }
}

impl From<&TranscodeConfig> for SchedulerSettings {
    fn from(config: &TranscodeConfig) -> Self {
        Self {
            segment_duration: f64::from(config.segment_duration_secs),
            safety_margin_pct: config.safety_margin_pct,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                cooldown: config.retry_cooldown(),
            },
            duration_probe_interval: config.duration_probe_interval(),
        }
    }
}

/// Result of one scheduler step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Duration of the source is not known yet.
    AwaitingDuration,
    /// Not enough of the file is downloaded for the next segment.
    AwaitingProgress { required: f64 },
    /// The next segment failed recently.
    CoolingDown { remaining: Duration },
    Produced { index: u32 },
    /// Attempt failed; the segment will be retried.
    Failed { index: u32, attempts: u32 },
    /// Retry budget exhausted; the segment is skipped for good.
    Abandoned { index: u32 },
    /// Every segment is processed or abandoned.
    Complete,
}

/// Number of segments covering `duration`.
pub fn total_segments(duration: f64, segment_duration: f64) -> u32 {
    if duration <= 0.0 || segment_duration <= 0.0 {
        return 0;
    }
    (duration / segment_duration).ceil() as u32
}

/// Download percentage needed before segment `index` may be cut.
///
/// ```
/// use seedstream::transcode::required_progress;
///
/// // Segment 4 of a 95 s file ends at 50 s, 52.63 % of the way in.
/// let required = required_progress(4, 10.0, 95.0, 5.0);
/// assert!((required - 57.631).abs() < 0.001);
/// assert_eq!(required_progress(9, 10.0, 95.0, 5.0), 100.0);
/// ```
pub fn required_progress(index: u32, segment_duration: f64, duration: f64, margin_pct: f64) -> f64 {
    let end = f64::from(index + 1) * segment_duration;
    (end / duration * 100.0 + margin_pct).min(100.0)
}

/// Drives a [`TranscodeWorker`] across one source file.
pub struct ProgressiveScheduler {
    worker: TranscodeWorker,
    source: PathBuf,
    output_dir: PathBuf,
    settings: SchedulerSettings,
    current: u32,
    duration: Option<f64>,
    store: SegmentStore,
    last_probe: Option<Instant>,
}

impl ProgressiveScheduler {
    pub fn new(
        worker: TranscodeWorker,
        source: PathBuf,
        output_dir: PathBuf,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            worker,
            source,
            output_dir,
            settings,
            current: 0,
            duration: None,
            store: SegmentStore::new(),
            last_probe: None,
        }
    }

    /// Seed a duration known from an earlier run.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration.filter(|d| d.is_finite() && *d > 0.0);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn current_segment(&self) -> u32 {
        self.current
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn total_segments(&self) -> Option<u32> {
        self.duration
            .map(|d| total_segments(d, self.settings.segment_duration))
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn failed_segments(&self) -> Vec<u32> {
        self.store.failed()
    }

    pub fn is_complete(&self) -> bool {
        self.total_segments()
            .is_some_and(|total| self.current >= total)
    }

    /// Trust segments a previous run left on disk.
    ///
    /// Walks forward from the cursor while the next segment file exists and
    /// validates. Returns how many were recovered.
    pub fn resume_from_disk(&mut self) -> u32 {
        let mut recovered = 0;
        loop {
            if self.total_segments().is_some_and(|t| self.current >= t) {
                break;
            }
            let Some(path) = segment_path(&self.output_dir, &self.source, self.current) else {
                break;
            };
            if !path.exists() || self.worker.toolkit().validate(&path).is_err() {
                break;
            }
            self.store.mark_processed(self.current);
            self.current += 1;
            recovered += 1;
        }

        if recovered > 0 {
            tracing::info!(
                recovered,
                next_segment = self.current,
                source = %self.source.display(),
                "Recovered segments from disk"
            );
        }
        recovered
    }

    fn ensure_duration(&mut self, drain: bool, now: Instant) -> Option<f64> {
        if let Some(d) = self.duration {
            return Some(d);
        }

        // In drain mode the file is complete; probe every time.
        if !drain {
            if let Some(last) = self.last_probe {
                if now.saturating_duration_since(last) < self.settings.duration_probe_interval {
                    return None;
                }
            }
        }
        self.last_probe = Some(now);

        match self.worker.toolkit().probe_duration(&self.source) {
            Ok(d) if d.is_finite() && d > 0.0 => {
                tracing::info!(duration_secs = d, source = %self.source.display(), "Source duration known");
                self.duration = Some(d);
                Some(d)
            }
            Ok(d) => {
                tracing::debug!(duration_secs = d, "Ignoring unusable duration");
                None
            }
            Err(e) => {
                tracing::debug!(source = %self.source.display(), "Duration not available yet: {}", e);
                None
            }
        }
    }

    /// Advance by at most one encoder call.
    ///
    /// `progress_pct` is the transfer's download percentage; `drain` drops
    /// the progress gate once the transfer is complete.
    pub fn step(&mut self, progress_pct: f64, drain: bool, now: Instant) -> StepOutcome {
        let Some(duration) = self.ensure_duration(drain, now) else {
            return StepOutcome::AwaitingDuration;
        };
        let segment_duration = self.settings.segment_duration;
        let total = total_segments(duration, segment_duration);

        while self.current < total && self.store.is_settled(self.current) {
            self.current += 1;
        }
        if self.current >= total {
            return StepOutcome::Complete;
        }
        let index = self.current;

        if !drain {
            let required = required_progress(
                index,
                segment_duration,
                duration,
                self.settings.safety_margin_pct,
            );
            if progress_pct < required {
                return StepOutcome::AwaitingProgress { required };
            }
        }

        let retry = self.settings.retry;
        if self.store.attempts(index) >= retry.max_retries {
            self.abandon(index);
            return StepOutcome::Abandoned { index };
        }
        if let Some(last) = self.store.last_attempt(index) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < retry.cooldown {
                return StepOutcome::CoolingDown {
                    remaining: retry.cooldown - elapsed,
                };
            }
        }

        let attempts = self.store.record_attempt(index, now);
        match self
            .worker
            .produce(&self.source, &self.output_dir, index, duration)
        {
            Ok(_) => {
                self.store.mark_processed(index);
                self.current += 1;
                StepOutcome::Produced { index }
            }
            Err(e) if attempts >= retry.max_retries => {
                tracing::error!(segment = index, attempts, "Segment failed permanently: {}", e);
                self.abandon(index);
                StepOutcome::Abandoned { index }
            }
            Err(e) => {
                tracing::warn!(
                    segment = index,
                    attempt = attempts,
                    max_retries = retry.max_retries,
                    "Segment attempt failed: {}",
                    e
                );
                StepOutcome::Failed { index, attempts }
            }
        }
    }

    fn abandon(&mut self, index: u32) {
        self.store.mark_failed(index);
        self.current = self.current.max(index + 1);
    }
}
