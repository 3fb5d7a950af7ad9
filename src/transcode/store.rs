//! Per-segment bookkeeping for one transcode job.

use std::collections::BTreeMap;
use std::time::Instant;

/// Outcome state of a segment index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentState {
    #[default]
    Unattempted,
    Processed,
    FailedPermanently,
}

/// What the scheduler knows about one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentRecord {
    pub state: SegmentState,
    pub attempts: u32,
    pub last_attempt: Option<Instant>,
}

/// In-memory segment records, keyed by index.
///
/// Indices never seen read as a default (unattempted) record. Once a
/// segment is processed or permanently failed its state never changes.
#[derive(Debug, Default)]
pub struct SegmentStore {
    records: BTreeMap<u32, SegmentRecord>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, index: u32) -> SegmentRecord {
        self.records.get(&index).copied().unwrap_or_default()
    }

    pub fn state(&self, index: u32) -> SegmentState {
        self.record(index).state
    }

    pub fn attempts(&self, index: u32) -> u32 {
        self.record(index).attempts
    }

    pub fn last_attempt(&self, index: u32) -> Option<Instant> {
        self.record(index).last_attempt
    }

    /// Processed or permanently failed.
    pub fn is_settled(&self, index: u32) -> bool {
        self.state(index) != SegmentState::Unattempted
    }

    /// Count an attempt starting at `at`. Returns the new attempt count.
    pub fn record_attempt(&mut self, index: u32, at: Instant) -> u32 {
        let record = self.records.entry(index).or_default();
        record.attempts += 1;
        record.last_attempt = Some(at);
        record.attempts
    }

    /// Mark `index` processed. No effect on a settled segment.
    pub fn mark_processed(&mut self, index: u32) {
        let record = self.records.entry(index).or_default();
        if record.state == SegmentState::Unattempted {
            record.state = SegmentState::Processed;
        }
    }

    /// Mark `index` permanently failed. No effect on a settled segment.
    pub fn mark_failed(&mut self, index: u32) {
        let record = self.records.entry(index).or_default();
        if record.state == SegmentState::Unattempted {
            record.state = SegmentState::FailedPermanently;
        }
    }

    fn indices_in(&self, state: SegmentState) -> Vec<u32> {
        self.records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(i, _)| *i)
            .collect()
    }

    /// Processed indices, ascending.
    pub fn processed(&self) -> Vec<u32> {
        self.indices_in(SegmentState::Processed)
    }

    /// Permanently failed indices, ascending.
    pub fn failed(&self) -> Vec<u32> {
        self.indices_in(SegmentState::FailedPermanently)
    }

    pub fn processed_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.state == SegmentState::Processed)
            .count()
    }
}
