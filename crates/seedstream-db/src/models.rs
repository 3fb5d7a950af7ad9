//! Rust models matching the database schema.

use chrono::{DateTime, Utc};
use seedstream_common::{MovieId, MovieStatus, SessionId};
use serde::{Deserialize, Serialize};

/// A movie record: one download-and-stream job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    /// Caller-supplied identifier (e.g. an IMDb id). Unique.
    pub external_id: String,
    /// Locator the transfer was started from (magnet link, `file://` URL, ...).
    pub descriptor: String,
    /// Transfer session, once one has been started for this movie.
    pub session_id: Option<SessionId>,
    /// Source file path relative to the media root, once metadata is known.
    pub file_path: Option<String>,
    /// Probed duration in seconds.
    pub duration_secs: Option<f64>,
    pub status: MovieStatus,
    /// Download progress in percent, `0.0..=100.0`.
    pub progress: f64,
    /// Sorted indices of segments that exhausted their retry budget.
    pub failed_segments: Vec<u32>,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
