//! Background download-and-stream jobs.
//!
//! One [`runner::JobRunner`] per movie, tracked in the [`JobRegistry`] so a
//! movie never has two runners and shutdown can cancel them all.

pub mod registry;
pub mod retention;
mod runner;

pub use registry::{JobRegistry, Registration};
pub use runner::{JobOutcome, JobRunner};

use crate::config::Config;
use crate::transfer::DownloadSessionManager;
use seedstream_av::MediaToolkit;
use seedstream_common::{Error, MovieId, MovieStatus, Result};
use seedstream_db::pool::{get_conn, DbPool};
use seedstream_db::queries::movies;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a job needs, shared by the HTTP layer and the runners.
#[derive(Clone)]
pub struct JobServices {
    pub pool: DbPool,
    pub sessions: DownloadSessionManager,
    pub toolkit: Arc<dyn MediaToolkit>,
    pub registry: JobRegistry,
    pub config: Arc<Config>,
}

/// `<media_root>/movies/<id>`: transfer destination and segment output.
pub fn movie_dir(media_root: &Path, id: MovieId) -> PathBuf {
    media_root.join("movies").join(id.to_string())
}

/// Run synchronous database or filesystem work on the blocking pool.
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("spawn_blocking join error: {}", e)))?
}

/// Launch a runner for `id` unless one is already registered.
///
/// The PENDING to DOWNLOADING move happens before this returns, so the
/// caller can report the new status right away. Returns whether a runner
/// was started.
pub async fn spawn_job(services: &JobServices, id: MovieId) -> Result<bool> {
    let Some(registration) = services.registry.try_register(id) else {
        tracing::debug!(movie_id = %id, "Job already running");
        return Ok(false);
    };

    let runner = JobRunner::new(services.clone(), id, registration.token.clone());
    let prepared = run_blocking(move || runner.prepare().map(|_| runner)).await;
    let runner = match prepared {
        Ok(runner) => runner,
        Err(e) => {
            services.registry.finish(id, &registration);
            return Err(e);
        }
    };

    let registry = services.registry.clone();
    tokio::spawn(async move {
        tracing::info!(movie_id = %id, "Job started");
        let outcome = runner.run().await;
        registry.finish(id, &registration);
        match &outcome {
            JobOutcome::Ready => tracing::info!(movie_id = %id, "Job finished"),
            JobOutcome::Failed { failed_segments } => tracing::warn!(
                movie_id = %id,
                failed = failed_segments.len(),
                "Job finished with failed segments"
            ),
            JobOutcome::Fatal(reason) => tracing::error!(movie_id = %id, "Job aborted: {}", reason),
            JobOutcome::Cancelled => tracing::info!(movie_id = %id, "Job stopped"),
        }
    });

    Ok(true)
}

/// Relaunch runners for movies left mid-flight by a previous process.
pub async fn resume_in_flight(services: &JobServices) -> Result<usize> {
    let in_flight: Vec<MovieStatus> = MovieStatus::ALL
        .into_iter()
        .filter(|s| s.is_in_flight())
        .collect();
    let pool = services.pool.clone();
    let pending =
        run_blocking(move || movies::list_by_status(&*get_conn(&pool)?, &in_flight)).await?;

    let mut resumed = 0;
    for movie in pending {
        match spawn_job(services, movie.id).await {
            Ok(true) => resumed += 1,
            Ok(false) => {}
            Err(e) => tracing::warn!(movie_id = %movie.id, "Failed to resume job: {}", e),
        }
    }

    if resumed > 0 {
        tracing::info!("Resumed {} in-flight job(s)", resumed);
    }
    Ok(resumed)
}
