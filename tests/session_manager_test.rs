//! Session table behaviour against a scripted transfer engine.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use seedstream::transfer::{
    DownloadSessionManager, TransferEngine, TransferFile, TransferHandle, TransferStatus,
};
use seedstream_common::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Descriptors look like `fake:<seeding|downloading>:<active secs>[:flags]`
/// with flags `fail-remove` and `no-metadata`.
#[derive(Default)]
struct FakeEngine {
    handles: Mutex<Vec<Arc<FakeHandle>>>,
}

struct FakeHandle {
    seeding: bool,
    active_seconds: u64,
    fail_remove: bool,
    metadata: AtomicBool,
    sequential: AtomicBool,
    removed: AtomicBool,
}

impl TransferEngine for FakeEngine {
    fn add_transfer(&self, descriptor: &str, _dest_dir: &Path) -> Result<Arc<dyn TransferHandle>> {
        let descriptor = if descriptor.starts_with("magnet:?") {
            "fake:downloading:0"
        } else {
            descriptor
        };
        let parts: Vec<&str> = descriptor.split(':').collect();
        if parts.len() < 3 || parts[0] != "fake" {
            return Err(Error::transfer(format!("bad descriptor {}", descriptor)));
        }
        let handle = Arc::new(FakeHandle {
            seeding: parts[1] == "seeding",
            active_seconds: parts[2].parse().unwrap(),
            fail_remove: parts.contains(&"fail-remove"),
            metadata: AtomicBool::new(!parts.contains(&"no-metadata")),
            sequential: AtomicBool::new(false),
            removed: AtomicBool::new(false),
        });
        self.handles.lock().push(handle.clone());
        Ok(handle as Arc<dyn TransferHandle>)
    }
}

impl TransferHandle for FakeHandle {
    fn has_metadata(&self) -> bool {
        self.metadata.load(Ordering::SeqCst)
    }

    fn set_sequential_mode(&self, enabled: bool) {
        self.sequential.store(enabled, Ordering::SeqCst);
    }

    fn status(&self) -> TransferStatus {
        TransferStatus {
            progress: if self.seeding { 1.0 } else { 0.5 },
            peers: 3,
            download_rate: 0,
            is_seeding: self.seeding,
            active_seconds: self.active_seconds,
        }
    }

    fn files(&self) -> Vec<TransferFile> {
        Vec::new()
    }

    fn remove(&self) -> Result<()> {
        if self.fail_remove {
            return Err(Error::transfer("engine refused removal"));
        }
        self.removed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn manager() -> (DownloadSessionManager, Arc<FakeEngine>, tempfile::TempDir) {
    let engine = Arc::new(FakeEngine::default());
    let manager = DownloadSessionManager::new(
        engine.clone(),
        Duration::from_secs(3600),
        vec!["udp://tracker.example:1337/announce".to_string()],
    );
    (manager, engine, tempfile::tempdir().unwrap())
}

#[test]
fn start_get_lock_stop() {
    let (manager, engine, dir) = manager();
    let dest = dir.path().join("movie");

    let id = manager.start("fake:downloading:10", &dest).unwrap();
    assert!(dest.is_dir());
    assert!(manager.get(id).is_some());
    assert!(manager.lock(id).is_some());
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.session_ids(), vec![id]);

    assert!(manager.stop(id).unwrap());
    assert!(manager.get(id).is_none());
    assert!(manager.lock(id).is_none());
    assert!(engine.handles.lock()[0].removed.load(Ordering::SeqCst));
    assert!(!manager.stop(id).unwrap());
}

#[test]
fn same_descriptor_gets_distinct_sessions() {
    let (manager, _, dir) = manager();
    let a = manager.start("fake:downloading:1", dir.path()).unwrap();
    let b = manager.start("fake:downloading:1", dir.path()).unwrap();
    assert_ne!(a, b);
    assert_eq!(manager.len(), 2);
}

#[test]
fn start_failure_registers_nothing() {
    let (manager, _, dir) = manager();
    let err = manager.start("bogus", dir.path()).unwrap_err();
    assert_matches!(err, Error::Transfer(_));
    assert!(manager.is_empty());
}

#[test]
fn magnet_descriptors_get_extra_trackers() {
    let (manager, _, dir) = manager();

    let magnet = manager.start("magnet:?xt=urn:btih:abc", dir.path()).unwrap();
    assert_eq!(
        manager.descriptor(magnet).unwrap(),
        "magnet:?xt=urn:btih:abc&tr=udp%3A%2F%2Ftracker.example%3A1337%2Fannounce"
    );

    let plain = manager.start("fake:downloading:1", dir.path()).unwrap();
    assert_eq!(manager.descriptor(plain).unwrap(), "fake:downloading:1");
}

#[test]
fn eviction_removes_only_idle_seeders() {
    let (manager, engine, dir) = manager();
    let idle_seeder = manager.start("fake:seeding:7200", dir.path()).unwrap();
    let fresh_seeder = manager.start("fake:seeding:60", dir.path()).unwrap();
    let old_download = manager.start("fake:downloading:7200", dir.path()).unwrap();

    assert_eq!(manager.evict_idle(), 1);
    assert!(manager.get(idle_seeder).is_none());
    assert!(manager.get(fresh_seeder).is_some());
    assert!(manager.get(old_download).is_some());

    let handles = engine.handles.lock();
    assert!(handles[0].removed.load(Ordering::SeqCst));
    assert!(!handles[1].removed.load(Ordering::SeqCst));
    assert!(!handles[2].removed.load(Ordering::SeqCst));
}

#[test]
fn evicted_sessions_are_remembered() {
    let (manager, _, dir) = manager();
    let seeder = manager.start("fake:seeding:7200", dir.path()).unwrap();
    let stopped = manager.start("fake:seeding:7200", dir.path()).unwrap();
    let stuck = manager
        .start("fake:seeding:7200:fail-remove", dir.path())
        .unwrap();

    assert!(manager.stop(stopped).unwrap());
    assert_eq!(manager.evict_idle(), 1);

    assert!(manager.was_evicted(seeder));
    assert!(!manager.was_evicted(stopped));
    assert!(!manager.was_evicted(stuck));
    assert!(!manager.was_evicted(seedstream_common::SessionId::new()));
}

#[tokio::test]
async fn eviction_skips_busy_sessions() {
    let (manager, _, dir) = manager();
    let id = manager.start("fake:seeding:7200", dir.path()).unwrap();

    let lock = manager.lock(id).unwrap();
    let guard = lock.lock().await;
    assert_eq!(manager.evict_idle(), 0);
    assert!(manager.get(id).is_some());

    drop(guard);
    assert_eq!(manager.evict_idle(), 1);
    assert!(manager.get(id).is_none());
}

#[test]
fn eviction_errors_do_not_stop_the_sweep() {
    let (manager, _, dir) = manager();
    let stuck = manager
        .start("fake:seeding:7200:fail-remove", dir.path())
        .unwrap();
    let other = manager.start("fake:seeding:7200", dir.path()).unwrap();

    assert_eq!(manager.evict_idle(), 1);
    assert!(manager.get(stuck).is_some());
    assert!(manager.get(other).is_none());
}

#[tokio::test]
async fn wait_for_metadata_outcomes() {
    let (manager, engine, dir) = manager();
    let cancel = CancellationToken::new();
    let poll = Duration::from_millis(5);

    let ready = manager.start("fake:downloading:1", dir.path()).unwrap();
    assert!(manager
        .wait_for_metadata(ready, poll, Duration::from_secs(1), &cancel)
        .await
        .unwrap());

    let slow = manager
        .start("fake:downloading:1:no-metadata", dir.path())
        .unwrap();
    let err = manager
        .wait_for_metadata(slow, poll, Duration::from_millis(30), &cancel)
        .await
        .unwrap_err();
    assert_matches!(err, Error::Transfer(_));

    // Metadata arriving mid-wait is picked up.
    let handle = engine.handles.lock()[1].clone();
    let waiter = {
        let manager = manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            manager
                .wait_for_metadata(slow, poll, Duration::from_secs(5), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.metadata.store(true, Ordering::SeqCst);
    assert!(waiter.await.unwrap().unwrap());

    let never = manager
        .start("fake:downloading:1:no-metadata", dir.path())
        .unwrap();
    cancel.cancel();
    assert!(!manager
        .wait_for_metadata(never, poll, Duration::from_secs(5), &cancel)
        .await
        .unwrap());

    let unknown = seedstream_common::SessionId::new();
    assert_matches!(
        manager
            .wait_for_metadata(unknown, poll, Duration::from_secs(1), &CancellationToken::new())
            .await,
        Err(Error::NotFound(_))
    );
}

#[tokio::test]
async fn eviction_task_stops_on_shutdown() {
    let (manager, _, dir) = manager();
    manager.start("fake:seeding:7200", dir.path()).unwrap();

    let shutdown = CancellationToken::new();
    let task = seedstream::transfer::start_eviction_task(
        manager.clone(),
        Duration::from_millis(10),
        shutdown.clone(),
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.is_empty());

    shutdown.cancel();
    task.await.unwrap();
}
