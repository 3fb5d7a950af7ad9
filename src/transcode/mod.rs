//! Progressive segment production.
//!
//! [`ProgressiveScheduler`] decides when each segment may be cut,
//! [`TranscodeWorker`] cuts it, and [`SegmentStore`] remembers the outcome.

mod scheduler;
mod store;
mod worker;

pub use scheduler::{
    required_progress, total_segments, ProgressiveScheduler, RetryPolicy, SchedulerSettings,
    StepOutcome,
};
pub use store::{SegmentRecord, SegmentState, SegmentStore};
pub use worker::{
    base_name, segment_bounds, segment_dir, segment_file_name, segment_path, staging_path,
    SegmentError, TranscodeWorker,
};
