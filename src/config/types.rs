use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub transfer: TransferConfig,

    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Root under which every movie gets `movies/<id>/`
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}
fn default_database_path() -> PathBuf {
    PathBuf::from("./seedstream.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            media_root: default_media_root(),
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamingConfig {
    /// Internal location prefix for `X-Accel-Redirect`. When unset, segments
    /// are served by this process.
    #[serde(default)]
    pub accel_redirect_prefix: Option<String>,

    /// Prefix of the API as seen by players; segment URIs in playlists
    /// start with it.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
}

fn default_public_prefix() -> String {
    "/api".to_string()
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            accel_redirect_prefix: None,
            public_prefix: default_public_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Length of one HLS segment in seconds (default: 10)
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Extra download progress, in percentage points, required beyond the
    /// segment's end before it is cut (default: 5.0)
    #[serde(default = "default_safety_margin")]
    pub safety_margin_pct: f64,

    /// Attempts per segment before it is abandoned (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum spacing between attempts of one segment (default: 30)
    #[serde(default = "default_retry_cooldown")]
    pub retry_cooldown_secs: u64,

    /// Scheduler tick (default: 1000)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Minimum spacing between duration probes of the partial file (default: 2)
    #[serde(default = "default_duration_probe_interval")]
    pub duration_probe_interval_secs: u64,

    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

fn default_segment_duration() -> u32 {
    10
}
fn default_safety_margin() -> f64 {
    5.0
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_cooldown() -> u64 {
    30
}
fn default_tick_interval() -> u64 {
    1000
}
fn default_duration_probe_interval() -> u64 {
    2
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            segment_duration_secs: default_segment_duration(),
            safety_margin_pct: default_safety_margin(),
            max_retries: default_max_retries(),
            retry_cooldown_secs: default_retry_cooldown(),
            tick_interval_ms: default_tick_interval(),
            duration_probe_interval_secs: default_duration_probe_interval(),
            ffmpeg_path: None,
            ffprobe_path: None,
        }
    }
}

impl TranscodeConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }

    pub fn duration_probe_interval(&self) -> Duration {
        Duration::from_secs(self.duration_probe_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// How often the eviction sweep runs (default: 300)
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,

    /// A seeding transfer active longer than this is evicted (default: 3600)
    #[serde(default = "default_seed_idle")]
    pub seed_idle_secs: u64,

    /// Give up on a transfer whose metadata never arrives (default: 600)
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    /// Copy rate of the local `file://` engine; unset copies at full speed
    #[serde(default)]
    pub local_rate_bytes_per_sec: Option<u64>,

    /// Tracker announce URLs appended to magnet links
    #[serde(default)]
    pub extra_trackers: Vec<String>,
}

fn default_eviction_interval() -> u64 {
    300
}
fn default_seed_idle() -> u64 {
    3600
}
fn default_metadata_timeout() -> u64 {
    600
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            eviction_interval_secs: default_eviction_interval(),
            seed_idle_secs: default_seed_idle(),
            metadata_timeout_secs: default_metadata_timeout(),
            local_rate_bytes_per_sec: None,
            extra_trackers: Vec::new(),
        }
    }
}

impl TransferConfig {
    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn seed_idle(&self) -> Duration {
        Duration::from_secs(self.seed_idle_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Media of movies not accessed for this many days is deleted and the
    /// record reset (default: 30)
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: u32,
}

fn default_stale_after_days() -> u32 {
    30
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            stale_after_days: default_stale_after_days(),
        }
    }
}

impl RetentionConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.stale_after_days))
    }
}
