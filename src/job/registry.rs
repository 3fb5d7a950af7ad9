//! Tracks which movies have a live runner.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use seedstream_common::MovieId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A claimed registry slot, handed back to [`JobRegistry::finish`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub token: CancellationToken,
    generation: u64,
}

/// Running jobs and their cancellation tokens.
///
/// Every job token is a child of one root token, so cancelling the root
/// stops every runner.
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<DashMap<MovieId, Registration>>,
    next_generation: Arc<AtomicU64>,
    root: CancellationToken,
}

impl JobRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            next_generation: Arc::new(AtomicU64::new(0)),
            root,
        }
    }

    /// Claim `id` for a new runner. `None` if one is already registered.
    pub fn try_register(&self, id: MovieId) -> Option<Registration> {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let registration = Registration {
                    token: self.root.child_token(),
                    generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
                };
                slot.insert(registration.clone());
                Some(registration)
            }
        }
    }

    /// Release the slot claimed by `registration`.
    ///
    /// A slot that was cancelled and claimed again in the meantime belongs
    /// to the newer runner and is left alone.
    pub fn finish(&self, id: MovieId, registration: &Registration) {
        self.jobs
            .remove_if(&id, |_, current| current.generation == registration.generation);
    }

    pub fn is_running(&self, id: MovieId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Cancel the runner for `id` and free its slot. Returns `false` if
    /// none is registered.
    pub fn cancel(&self, id: MovieId) -> bool {
        match self.jobs.remove(&id) {
            Some((_, registration)) => {
                registration.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every runner.
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
