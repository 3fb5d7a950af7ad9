//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a file-backed database in a
//! scratch directory, a [`LocalTransferEngine`] session manager and a
//! [`FakeToolkit`] standing in for ffmpeg. [`TestHarness::with_server`]
//! additionally starts Axum on a random port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use seedstream::config::Config;
use seedstream::job::{JobRegistry, JobServices};
use seedstream::server::{create_router, AppContext};
use seedstream::transfer::{DownloadSessionManager, LocalTransferEngine};
use seedstream_av::{EncodeMode, MediaToolkit, StreamInfo};
use seedstream_common::{MovieId, MovieStatus};
use seedstream_db::models::Movie;
use seedstream_db::pool::{get_conn, init_pool, DbPool, PooledConnection};
use seedstream_db::queries::movies;
use tempfile::TempDir;

/// Parks one `encode_segment` call after it has written part of its output,
/// until the test releases it.
#[derive(Default)]
pub struct SegmentHold {
    entered: AtomicBool,
    released: AtomicBool,
}

impl SegmentHold {
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    /// Wait until the encoder is parked. `false` on timeout.
    pub async fn entered(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.entered.load(Ordering::SeqCst) {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    fn park(&self) {
        self.entered.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(30);
        while !self.released.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

/// Media toolkit that reports a fixed duration and writes a few bytes per
/// segment. Segments listed in `failing` never encode.
pub struct FakeToolkit {
    duration: f64,
    segment_duration: f64,
    failing: Vec<u32>,
    hold: Option<(u32, Arc<SegmentHold>)>,
    pub encoded: Mutex<Vec<u32>>,
}

impl FakeToolkit {
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            segment_duration: 10.0,
            failing: Vec::new(),
            hold: None,
            encoded: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, segments: &[u32]) -> Self {
        self.failing = segments.to_vec();
        self
    }

    /// Park the first encode of `index` on `hold`.
    pub fn holding(mut self, index: u32, hold: Arc<SegmentHold>) -> Self {
        self.hold = Some((index, hold));
        self
    }
}

impl MediaToolkit for FakeToolkit {
    fn probe_duration(&self, path: &Path) -> seedstream_av::Result<f64> {
        if !path.exists() {
            return Err(seedstream_av::Error::file_not_found(path));
        }
        Ok(self.duration)
    }

    fn probe_stream_info(&self, path: &Path) -> seedstream_av::Result<StreamInfo> {
        if !path.exists() {
            return Err(seedstream_av::Error::file_not_found(path));
        }
        Ok(StreamInfo {
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            duration_secs: Some(self.duration),
        })
    }

    fn encode_segment(
        &self,
        _input: &Path,
        start_secs: f64,
        _length_secs: f64,
        output: &Path,
        _mode: EncodeMode,
    ) -> seedstream_av::Result<()> {
        let index = (start_secs / self.segment_duration).round() as u32;
        if self.failing.contains(&index) {
            return Err(seedstream_av::Error::tool_failed(
                "ffmpeg",
                format!("segment {} is corrupt", index),
            ));
        }
        if let Some((held, hold)) = &self.hold {
            if *held == index && !hold.released.load(Ordering::SeqCst) {
                std::fs::write(output, b"partial")?;
                hold.park();
            }
        }
        std::fs::write(output, format!("segment {}", index))?;
        self.encoded.lock().push(index);
        Ok(())
    }
}

/// Config pointing at `root`, with fast ticks and no retry cooldown.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.server.media_root = root.join("media");
    config.server.database_path = root.join("seedstream.db");
    config.transcode.tick_interval_ms = 10;
    config.transcode.retry_cooldown_secs = 0;
    config.transcode.duration_probe_interval_secs = 0;
    config.transfer.metadata_timeout_secs = 5;
    config
}

/// Test harness wrapping fully constructed [`JobServices`] and
/// [`AppContext`].
pub struct TestHarness {
    pub dir: TempDir,
    pub services: JobServices,
    pub ctx: AppContext,
    pub toolkit: Arc<FakeToolkit>,
}

impl TestHarness {
    /// A 95 second asset that encodes cleanly.
    pub fn new() -> Self {
        Self::with_toolkit(FakeToolkit::new(95.0))
    }

    pub fn with_toolkit(toolkit: FakeToolkit) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let config = test_config(dir.path());
        Self::build(dir, config, toolkit)
    }

    pub fn with_config(configure: impl FnOnce(&mut Config), toolkit: FakeToolkit) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = test_config(dir.path());
        configure(&mut config);
        Self::build(dir, config, toolkit)
    }

    fn build(dir: TempDir, config: Config, toolkit: FakeToolkit) -> Self {
        std::fs::create_dir_all(&config.server.media_root).expect("failed to create media root");
        let pool = init_pool(config.server.database_path.to_str().expect("utf-8 path"))
            .expect("failed to create pool");

        let sessions = DownloadSessionManager::new(
            Arc::new(LocalTransferEngine::default()),
            config.transfer.seed_idle(),
            Vec::new(),
        );
        let toolkit = Arc::new(toolkit);
        let services = JobServices {
            pool,
            sessions,
            toolkit: toolkit.clone() as Arc<dyn MediaToolkit>,
            registry: JobRegistry::default(),
            config: Arc::new(config),
        };
        let ctx = AppContext::new(services.clone());

        Self {
            dir,
            services,
            ctx,
            toolkit,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::new().serve().await
    }

    pub async fn serve(self) -> (Self, SocketAddr) {
        let app = create_router(self.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (self, addr)
    }

    pub fn db(&self) -> &DbPool {
        &self.services.pool
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> PooledConnection {
        get_conn(self.db()).expect("failed to get db connection")
    }

    pub fn media_root(&self) -> &Path {
        &self.services.config.server.media_root
    }

    /// Write a `size`-byte source file outside the media root and return its
    /// `file://` descriptor.
    pub fn source_file(&self, name: &str, size: usize) -> (PathBuf, String) {
        let dir = self.dir.path().join("sources");
        std::fs::create_dir_all(&dir).expect("failed to create sources dir");
        let path = dir.join(name);
        let data: Vec<u8> = (0..=255u8).cycle().take(size).collect();
        std::fs::write(&path, data).expect("failed to write source");
        let descriptor = format!("file://{}", path.display());
        (path, descriptor)
    }

    pub fn movie(&self, id: MovieId) -> Movie {
        movies::get_movie(&self.conn(), id).expect("movie exists")
    }

    /// Poll until the movie reaches a terminal status or `timeout` passes.
    pub async fn wait_for_terminal(&self, id: MovieId, timeout: Duration) -> Movie {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let movie = self.movie(id);
            if movie.status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return movie;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Poll until no runner is registered for `id`.
    pub async fn wait_for_idle(&self, id: MovieId, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.services.registry.is_running(id) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Statuses the movie passes through, sampled until terminal.
    pub async fn record_statuses(&self, id: MovieId, timeout: Duration) -> Vec<MovieStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = Vec::new();
        loop {
            let status = self.movie(id).status;
            if seen.last() != Some(&status) {
                seen.push(status);
            }
            if status.is_terminal() || tokio::time::Instant::now() >= deadline {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
