//! Download session table.
//!
//! Two levels of locking: a manager-wide lock over the table for every
//! insertion and removal, and a per-session async lock that callers hold
//! while they use a handle. The eviction sweep only tries per-session locks,
//! so it never waits on a busy session and never drops one in use.
//!
//! Evicted ids are remembered so a runner that finds its session gone can
//! tell a finished transfer from one that vanished.

use parking_lot::Mutex;
use seedstream_common::{Error, Result, SessionId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{with_trackers, TransferEngine, TransferHandle};

struct Session {
    handle: Arc<dyn TransferHandle>,
    descriptor: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

struct Inner {
    engine: Arc<dyn TransferEngine>,
    sessions: Mutex<HashMap<SessionId, Session>>,
    /// Written under the `sessions` lock, before the entry disappears.
    evicted: Mutex<HashSet<SessionId>>,
    seed_idle: Duration,
    extra_trackers: Vec<String>,
}

/// Owns every active transfer.
#[derive(Clone)]
pub struct DownloadSessionManager {
    inner: Arc<Inner>,
}

impl DownloadSessionManager {
    /// Create a manager.
    ///
    /// # Arguments
    /// * `engine` - Engine used to start transfers.
    /// * `seed_idle` - Seeding sessions active longer than this are evicted.
    /// * `extra_trackers` - Appended to magnet descriptors on start.
    pub fn new(
        engine: Arc<dyn TransferEngine>,
        seed_idle: Duration,
        extra_trackers: Vec<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                sessions: Mutex::new(HashMap::new()),
                evicted: Mutex::new(HashSet::new()),
                seed_idle,
                extra_trackers,
            }),
        }
    }

    /// Start a transfer into `dest_dir` and register it under a fresh id.
    ///
    /// Descriptors are not deduplicated; starting the same one twice yields
    /// two sessions.
    pub fn start(&self, descriptor: &str, dest_dir: &Path) -> Result<SessionId> {
        std::fs::create_dir_all(dest_dir)?;
        let descriptor = with_trackers(descriptor, &self.inner.extra_trackers);

        let mut sessions = self.inner.sessions.lock();
        let handle = self.inner.engine.add_transfer(&descriptor, dest_dir)?;
        let id = SessionId::new();
        sessions.insert(
            id,
            Session {
                handle,
                descriptor,
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        );

        tracing::info!(session_id = %id, dest = %dest_dir.display(), "Started download session");
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<dyn TransferHandle>> {
        self.inner
            .sessions
            .lock()
            .get(&id)
            .map(|s| Arc::clone(&s.handle))
    }

    /// The per-session lock; hold it while using the handle.
    pub fn lock(&self, id: SessionId) -> Option<Arc<tokio::sync::Mutex<()>>> {
        self.inner
            .sessions
            .lock()
            .get(&id)
            .map(|s| Arc::clone(&s.lock))
    }

    /// Descriptor the session was started with (trackers included).
    pub fn descriptor(&self, id: SessionId) -> Option<String> {
        self.inner
            .sessions
            .lock()
            .get(&id)
            .map(|s| s.descriptor.clone())
    }

    /// Remove a session and stop its transfer. Returns `false` if unknown.
    pub fn stop(&self, id: SessionId) -> Result<bool> {
        let removed = self.inner.sessions.lock().remove(&id);
        match removed {
            Some(session) => {
                session.handle.remove()?;
                tracing::info!(session_id = %id, "Stopped download session");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Evict seeding sessions that have been active longer than the idle
    /// window. Returns the number evicted.
    pub fn evict_idle(&self) -> usize {
        let idle_secs = self.inner.seed_idle.as_secs();
        let evicted_ids = &self.inner.evicted;
        let mut evicted = 0;

        self.inner.sessions.lock().retain(|id, session| {
            let Ok(_guard) = session.lock.try_lock() else {
                tracing::debug!(session_id = %id, "Session busy, skipping eviction");
                return true;
            };

            let status = session.handle.status();
            if !status.is_seeding || status.active_seconds <= idle_secs {
                return true;
            }

            match session.handle.remove() {
                Ok(()) => {
                    evicted_ids.lock().insert(*id);
                    tracing::info!(
                        session_id = %id,
                        active_secs = status.active_seconds,
                        "Evicted seeding session"
                    );
                    evicted += 1;
                    false
                }
                Err(e) => {
                    tracing::warn!(session_id = %id, "Failed to evict session: {}", e);
                    true
                }
            }
        });

        if evicted > 0 {
            tracing::debug!(evicted, "Eviction sweep finished");
        }
        evicted
    }

    /// Whether `id` was removed by the sweep after it finished seeding.
    pub fn was_evicted(&self, id: SessionId) -> bool {
        self.inner.evicted.lock().contains(&id)
    }

    /// Poll `has_metadata` until it is true.
    ///
    /// Returns `Ok(false)` if `cancel` fires first. Running out of `timeout`
    /// is an error.
    pub async fn wait_for_metadata(
        &self,
        id: SessionId,
        poll: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let lock = self
                .lock(id)
                .ok_or_else(|| Error::not_found(format!("session {}", id)))?;
            {
                let _guard = lock.lock().await;
                let handle = self
                    .get(id)
                    .ok_or_else(|| Error::not_found(format!("session {}", id)))?;
                if handle.has_metadata() {
                    return Ok(true);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::transfer(format!(
                    "no metadata for session {} after {:?}",
                    id, timeout
                )));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(false),
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.inner.sessions.lock().keys().copied().collect()
    }
}

/// Start a background task that periodically evicts idle seeding sessions.
///
/// # Arguments
/// * `manager` - The session manager to sweep.
/// * `interval` - How often to run the sweep.
/// * `shutdown` - Stops the task when cancelled.
pub fn start_eviction_task(
    manager: DownloadSessionManager,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    // Engine calls may block.
                    let sweeper = manager.clone();
                    let swept = tokio::task::spawn_blocking(move || sweeper.evict_idle()).await;
                    if let Err(e) = swept {
                        tracing::warn!("Eviction sweep panicked: {}", e);
                    }
                }
            }
        }
        tracing::debug!("Eviction task stopped");
    })
}
