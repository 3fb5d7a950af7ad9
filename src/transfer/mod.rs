//! Peer-to-peer transfer seam and the session table built on it.
//!
//! The engine itself is external; everything here talks to it through
//! [`TransferEngine`] and [`TransferHandle`]. [`LocalTransferEngine`] is an
//! in-process engine for `file://` descriptors.

mod descriptor;
mod local;
mod manager;

pub use descriptor::{is_magnet, normalize_descriptor, with_trackers};
pub use local::LocalTransferEngine;
pub use manager::{start_eviction_task, DownloadSessionManager};

use seedstream_common::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Snapshot of a running transfer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferStatus {
    /// Fraction downloaded, `0.0..=1.0`.
    pub progress: f64,
    pub peers: u32,
    /// Bytes per second.
    pub download_rate: u64,
    /// Every piece is present and the transfer is only uploading.
    pub is_seeding: bool,
    /// Seconds since the transfer was added.
    pub active_seconds: u64,
}

impl TransferStatus {
    /// Progress as a percentage, `0.0..=100.0`.
    pub fn percent(&self) -> f64 {
        (self.progress * 100.0).clamp(0.0, 100.0)
    }
}

/// One file inside a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferFile {
    /// Path relative to the transfer's destination directory.
    pub relative_path: PathBuf,
    pub size_bytes: u64,
}

/// A transfer engine able to start downloads.
pub trait TransferEngine: Send + Sync {
    /// Begin transferring `descriptor` into `dest_dir`.
    fn add_transfer(&self, descriptor: &str, dest_dir: &Path) -> Result<Arc<dyn TransferHandle>>;
}

/// A single running transfer.
pub trait TransferHandle: Send + Sync {
    /// The file list is known.
    fn has_metadata(&self) -> bool;

    /// Ask the engine to fetch pieces in file order.
    fn set_sequential_mode(&self, enabled: bool);

    fn status(&self) -> TransferStatus;

    /// Files in the transfer. Empty until metadata is known.
    fn files(&self) -> Vec<TransferFile>;

    /// Stop the transfer and release engine resources. Downloaded data
    /// stays on disk.
    fn remove(&self) -> Result<()>;
}
