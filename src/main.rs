mod cli;

use seedstream::{
    config,
    job::{self, JobRegistry, JobServices},
    server::{self, AppContext},
    transfer::{start_eviction_task, DownloadSessionManager, LocalTransferEngine},
};
use seedstream_av::{FfmpegToolkit, MediaToolkit};
use seedstream_db::pool::init_pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Seedstream server");

    std::fs::create_dir_all(&config.server.media_root).with_context(|| {
        format!(
            "Failed to create media root {}",
            config.server.media_root.display()
        )
    })?;

    let db_path = config.server.database_path.to_string_lossy().into_owned();
    tracing::info!("Initializing database at {}", db_path);
    let pool = init_pool(&db_path)?;

    let toolkit = FfmpegToolkit::discover(
        config.transcode.ffmpeg_path.as_deref(),
        config.transcode.ffprobe_path.as_deref(),
    )
    .context("ffmpeg and ffprobe are required")?;
    tracing::info!(
        ffmpeg = %toolkit.ffmpeg_path().display(),
        ffprobe = %toolkit.ffprobe_path().display(),
        "Media tools found"
    );

    let shutdown = CancellationToken::new();

    // No peer-to-peer engine is linked in; only file:// descriptors transfer.
    let engine = Arc::new(LocalTransferEngine::new(
        config.transfer.local_rate_bytes_per_sec,
    ));
    let sessions = DownloadSessionManager::new(
        engine,
        config.transfer.seed_idle(),
        config.transfer.extra_trackers.clone(),
    );
    let eviction_handle = start_eviction_task(
        sessions.clone(),
        config.transfer.eviction_interval(),
        shutdown.clone(),
    );

    let services = JobServices {
        pool,
        sessions,
        toolkit: Arc::new(toolkit) as Arc<dyn MediaToolkit>,
        registry: JobRegistry::new(shutdown.child_token()),
        config: Arc::new(config),
    };

    if let Err(e) = job::resume_in_flight(&services).await {
        tracing::warn!("Failed to resume in-flight jobs: {}", e);
    }

    let server_result =
        server::start_server(AppContext::new(services.clone()), shutdown.clone()).await;

    // Cleanup
    tracing::info!("Shutting down...");
    shutdown.cancel();
    services.registry.cancel_all();
    let _ = eviction_handle.await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "seedstream=trace,seedstream_av=trace,seedstream_db=debug,seedstream_common=debug,tower_http=debug".to_string()
        } else {
            "seedstream=debug,seedstream_av=info,seedstream_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::CheckTools => check_tools(),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("seedstream {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn probe_file(
    file: &std::path::Path,
    json: bool,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let toolkit = FfmpegToolkit::discover(
        config.transcode.ffmpeg_path.as_deref(),
        config.transcode.ffprobe_path.as_deref(),
    )?;
    let info = toolkit.probe_stream_info(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Container: {}", info.container);
    if let Some(secs) = info.duration_secs {
        let whole = secs as u64;
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.3}s)",
            whole / 3600,
            (whole / 60) % 60,
            whole % 60,
            secs
        );
    }
    println!(
        "Video: {}",
        info.video_codec.as_deref().unwrap_or("none")
    );
    println!(
        "Audio: {}",
        info.audio_codec.as_deref().unwrap_or("none")
    );
    println!(
        "Segments: {}",
        if info.is_web_compatible() {
            "stream copy"
        } else {
            "re-encode"
        }
    );

    Ok(())
}

fn check_tools() -> Result<()> {
    println!("Checking external tools...\n");

    let tools = seedstream_av::check_tools();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Segments cannot be produced without ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Media root: {}", config.server.media_root.display());
            println!("  Database: {}", config.server.database_path.display());
            println!(
                "  Segments: {}s, {} retries, {}s cooldown",
                config.transcode.segment_duration_secs,
                config.transcode.max_retries,
                config.transcode.retry_cooldown_secs
            );
            println!(
                "  Accel redirect: {}",
                config
                    .streaming
                    .accel_redirect_prefix
                    .as_deref()
                    .unwrap_or("disabled")
            );
            println!("  Retention: {} days", config.retention.stale_after_days);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
