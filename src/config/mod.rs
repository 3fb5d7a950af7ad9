mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./seedstream.toml",
        "~/.config/seedstream/config.toml",
        "/etc/seedstream/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    let transcode = &config.transcode;
    if transcode.segment_duration_secs == 0 {
        anyhow::bail!("transcode.segment_duration_secs must be positive");
    }
    if transcode.max_retries == 0 {
        anyhow::bail!("transcode.max_retries must be at least 1");
    }
    if !transcode.safety_margin_pct.is_finite() || transcode.safety_margin_pct < 0.0 {
        anyhow::bail!(
            "transcode.safety_margin_pct must be a non-negative number, got {}",
            transcode.safety_margin_pct
        );
    }
    if transcode.tick_interval_ms == 0 {
        anyhow::bail!("transcode.tick_interval_ms must be positive");
    }

    if config.transfer.eviction_interval_secs == 0 {
        anyhow::bail!("transfer.eviction_interval_secs must be positive");
    }
    if config.transfer.local_rate_bytes_per_sec == Some(0) {
        anyhow::bail!("transfer.local_rate_bytes_per_sec must be positive when set");
    }

    for tracker in &config.transfer.extra_trackers {
        if tracker.trim().is_empty() {
            anyhow::bail!("transfer.extra_trackers contains an empty entry");
        }
    }

    if !config.server.media_root.exists() {
        tracing::warn!(
            "Media root does not exist yet and will be created: {:?}",
            config.server.media_root
        );
    }

    Ok(())
}
