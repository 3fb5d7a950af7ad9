//! In-process engine for `file://` descriptors.
//!
//! Copies a local file into the destination directory front to back,
//! optionally rate limited, so the file grows on disk the way a sequential
//! peer-to-peer download does.

use governor::{Quota, RateLimiter};
use parking_lot::Mutex;
use seedstream_common::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{TransferEngine, TransferFile, TransferHandle, TransferStatus};

const CHUNK_SIZE: usize = 64 * 1024;

type ByteLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// One cell per byte, bursting at most one chunk.
fn byte_limiter(rate_bytes_per_sec: u64) -> Option<ByteLimiter> {
    let rate = NonZeroU32::new(u32::try_from(rate_bytes_per_sec).unwrap_or(u32::MAX))?;
    let burst = NonZeroU32::new(CHUNK_SIZE as u32)?;
    Some(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

/// [`TransferEngine`] that "downloads" local files.
#[derive(Debug, Clone, Default)]
pub struct LocalTransferEngine {
    rate_bytes_per_sec: Option<u64>,
}

impl LocalTransferEngine {
    /// `rate_bytes_per_sec` of `None` copies at full speed.
    pub fn new(rate_bytes_per_sec: Option<u64>) -> Self {
        Self { rate_bytes_per_sec }
    }
}

/// Resolve a `file://` descriptor to a path.
fn source_path(descriptor: &str) -> Result<PathBuf> {
    let raw = descriptor
        .strip_prefix("file://")
        .ok_or_else(|| Error::transfer(format!("unsupported descriptor: {}", descriptor)))?;
    let decoded = urlencoding::decode(raw)
        .map_err(|e| Error::transfer(format!("invalid descriptor {}: {}", descriptor, e)))?;
    Ok(PathBuf::from(decoded.into_owned()))
}

impl TransferEngine for LocalTransferEngine {
    fn add_transfer(&self, descriptor: &str, dest_dir: &Path) -> Result<Arc<dyn TransferHandle>> {
        let source = source_path(descriptor)?;
        let metadata = std::fs::metadata(&source)
            .map_err(|e| Error::transfer(format!("cannot read {}: {}", source.display(), e)))?;
        if !metadata.is_file() {
            return Err(Error::transfer(format!(
                "{} is not a regular file",
                source.display()
            )));
        }

        let file_name = source
            .file_name()
            .ok_or_else(|| Error::transfer(format!("{} has no file name", source.display())))?;
        std::fs::create_dir_all(dest_dir)?;

        let transfer = Arc::new(LocalTransfer {
            file: TransferFile {
                relative_path: PathBuf::from(file_name),
                size_bytes: metadata.len(),
            },
            copied: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            sequential: AtomicBool::new(false),
            started_at: Instant::now(),
            failure: Mutex::new(None),
            limiter: self.rate_bytes_per_sec.and_then(byte_limiter),
        });

        let target = dest_dir.join(file_name);
        let worker = Arc::clone(&transfer);
        std::thread::Builder::new()
            .name("local-transfer".to_string())
            .spawn(move || {
                if let Err(e) = worker.copy(&source, &target) {
                    tracing::error!(source = %source.display(), "Local transfer failed: {}", e);
                    *worker.failure.lock() = Some(e.to_string());
                }
            })?;

        tracing::info!(descriptor = %descriptor, dest = %dest_dir.display(), "Local transfer started");
        Ok(transfer as Arc<dyn TransferHandle>)
    }
}

struct LocalTransfer {
    file: TransferFile,
    copied: AtomicU64,
    finished: AtomicBool,
    stopped: AtomicBool,
    sequential: AtomicBool,
    started_at: Instant,
    failure: Mutex<Option<String>>,
    limiter: Option<ByteLimiter>,
}

impl LocalTransfer {
    fn copy(&self, source: &Path, target: &Path) -> std::io::Result<()> {
        let mut reader = File::open(source)?;
        let mut writer = File::create(target)?;
        let mut buf = vec![0u8; CHUNK_SIZE];

        while !self.stopped.load(Ordering::Relaxed) {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                writer.flush()?;
                self.finished.store(true, Ordering::Release);
                tracing::debug!(target = %target.display(), "Local transfer complete");
                return Ok(());
            }
            self.pace(n)?;
            writer.write_all(&buf[..n])?;
            writer.flush()?;
            self.copied.fetch_add(n as u64, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Block the copy thread until `bytes` more may be written.
    fn pace(&self, bytes: usize) -> std::io::Result<()> {
        let (Some(limiter), Some(cells)) = (&self.limiter, NonZeroU32::new(bytes as u32)) else {
            return Ok(());
        };
        futures::executor::block_on(limiter.until_n_ready(cells))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
    }
}

impl TransferHandle for LocalTransfer {
    fn has_metadata(&self) -> bool {
        true
    }

    fn set_sequential_mode(&self, enabled: bool) {
        self.sequential.store(enabled, Ordering::Relaxed);
    }

    fn status(&self) -> TransferStatus {
        let copied = self.copied.load(Ordering::Acquire);
        let finished = self.finished.load(Ordering::Acquire);
        let elapsed = self.started_at.elapsed();
        let progress = if finished || self.file.size_bytes == 0 {
            1.0
        } else {
            copied as f64 / self.file.size_bytes as f64
        };
        let download_rate = if finished || elapsed.as_secs_f64() <= 0.0 {
            0
        } else {
            (copied as f64 / elapsed.as_secs_f64()) as u64
        };

        TransferStatus {
            progress,
            peers: 0,
            download_rate,
            is_seeding: finished,
            active_seconds: elapsed.as_secs(),
        }
    }

    fn files(&self) -> Vec<TransferFile> {
        vec![self.file.clone()]
    }

    fn remove(&self) -> Result<()> {
        self.stopped.store(true, Ordering::Relaxed);
        match self.failure.lock().as_ref() {
            Some(reason) => Err(Error::transfer(reason.clone())),
            None => Ok(()),
        }
    }
}
