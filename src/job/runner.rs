//! Per-movie orchestration.
//!
//! A runner starts (or reattaches to) the movie's transfer, waits for its
//! metadata, picks the media file and then ticks a [`ProgressiveScheduler`]
//! until every segment is settled. It is the only writer of the movie's
//! status and progress while it runs.

use anyhow::{bail, Context};
use seedstream_common::paths::pick_media_file;
use seedstream_common::{Error, MovieId, MovieStatus, Result, SessionId};
use seedstream_db::models::Movie;
use seedstream_db::pool::{get_conn, PooledConnection};
use seedstream_db::queries::movies;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{movie_dir, JobServices};
use crate::transcode::{ProgressiveScheduler, SchedulerSettings, StepOutcome, TranscodeWorker};
use crate::transfer::TransferStatus;

/// How a runner ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    /// Every segment was produced.
    Ready,
    /// Finished with permanently failed segments.
    Failed { failed_segments: Vec<u32> },
    /// The job could not continue.
    Fatal(String),
    /// Stopped by cancellation; status left as is.
    Cancelled,
}

/// Next status along the happy path.
fn successor(status: MovieStatus) -> Option<MovieStatus> {
    match status {
        MovieStatus::Pending => Some(MovieStatus::Downloading),
        MovieStatus::Downloading => Some(MovieStatus::DownloadingAndConverting),
        MovieStatus::DownloadingAndConverting => Some(MovieStatus::Playable),
        MovieStatus::Playable => Some(MovieStatus::Ready),
        MovieStatus::Ready | MovieStatus::Error => None,
    }
}

pub struct JobRunner {
    services: JobServices,
    movie_id: MovieId,
    cancel: CancellationToken,
}

impl JobRunner {
    pub fn new(services: JobServices, movie_id: MovieId, cancel: CancellationToken) -> Self {
        Self {
            services,
            movie_id,
            cancel,
        }
    }

    fn conn(&self) -> Result<PooledConnection> {
        get_conn(&self.services.pool)
    }

    /// Move forward along the happy path until `target` is reached.
    ///
    /// Never moves backwards; a movie already at or past `target` is left
    /// alone.
    fn advance(&self, target: MovieStatus) -> Result<MovieStatus> {
        let conn = self.conn()?;
        let target_stage = target
            .stage()
            .ok_or_else(|| Error::internal("cannot advance to ERROR"))?;

        loop {
            let current = movies::get_movie(&conn, self.movie_id)?.status;
            match current.stage() {
                Some(stage) if stage >= target_stage => return Ok(current),
                // Reset underneath us; only `prepare` may leave PENDING.
                Some(0) if target != MovieStatus::Downloading => {
                    return Err(Error::InvalidTransition {
                        from: current,
                        to: target,
                    })
                }
                Some(_) => {}
                None => {
                    return Err(Error::InvalidTransition {
                        from: current,
                        to: target,
                    })
                }
            }
            let next = successor(current).ok_or(Error::InvalidTransition {
                from: current,
                to: target,
            })?;
            movies::transition_status(&conn, self.movie_id, next)?;
            tracing::info!(movie_id = %self.movie_id, from = %current, to = %next, "Status changed");
        }
    }

    /// Synchronous part of starting a job: PENDING becomes DOWNLOADING.
    pub fn prepare(&self) -> Result<MovieStatus> {
        let status = movies::get_movie(&*self.conn()?, self.movie_id)?.status;
        if status.is_terminal() {
            return Ok(status);
        }
        self.advance(MovieStatus::Downloading)
    }

    /// Drive the job to completion.
    pub async fn run(self) -> JobOutcome {
        match self.drive().await {
            Ok(outcome) => outcome,
            Err(_) if self.cancel.is_cancelled() => JobOutcome::Cancelled,
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::error!(movie_id = %self.movie_id, "Job failed: {}", reason);
                if let Err(e) = self.mark_error() {
                    tracing::warn!(movie_id = %self.movie_id, "Failed to record job error: {}", e);
                }
                JobOutcome::Fatal(reason)
            }
        }
    }

    fn mark_error(&self) -> Result<()> {
        let conn = self.conn()?;
        let mut status = movies::get_movie(&conn, self.movie_id)?.status;
        if status == MovieStatus::Pending {
            status = movies::transition_status(&conn, self.movie_id, MovieStatus::Downloading)?;
        }
        if !status.is_terminal() {
            movies::transition_status(&conn, self.movie_id, MovieStatus::Error)?;
        }
        Ok(())
    }

    async fn drive(&self) -> anyhow::Result<JobOutcome> {
        let movie = movies::get_movie(&*self.conn()?, self.movie_id)?;
        match movie.status {
            MovieStatus::Ready => return Ok(JobOutcome::Ready),
            MovieStatus::Error => {
                return Ok(JobOutcome::Failed {
                    failed_segments: movie.failed_segments,
                })
            }
            _ => {}
        }
        self.advance(MovieStatus::Downloading)?;

        let media_root = &self.services.config.server.media_root;
        let dest = movie_dir(media_root, self.movie_id);
        let session_id = self.attach_session(&movie, &dest)?;

        let transfer = &self.services.config.transfer;
        let ready = self
            .services
            .sessions
            .wait_for_metadata(
                session_id,
                self.services.config.transcode.tick_interval(),
                transfer.metadata_timeout(),
                &self.cancel,
            )
            .await?;
        if !ready {
            return Ok(JobOutcome::Cancelled);
        }

        let relative = self.select_media_file(session_id).await?;
        if self.cancel.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }
        let source = dest.join(&relative);
        let stored = Path::new("movies")
            .join(self.movie_id.to_string())
            .join(&relative);
        movies::set_file_path(&*self.conn()?, self.movie_id, &stored.to_string_lossy())?;
        tracing::info!(movie_id = %self.movie_id, file = %stored.display(), "Media file selected");

        let settings = SchedulerSettings::from(&self.services.config.transcode);
        let worker = TranscodeWorker::new(self.services.toolkit.clone(), settings.segment_duration);
        let scheduler = ProgressiveScheduler::new(worker, source.clone(), dest, settings)
            .with_duration(movie.duration_secs);

        let (scheduler, recovered) = tokio::task::spawn_blocking(move || {
            let mut scheduler = scheduler;
            let recovered = scheduler.resume_from_disk();
            (scheduler, recovered)
        })
        .await?;
        if self.cancel.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        self.advance(MovieStatus::DownloadingAndConverting)?;
        if recovered > 0 {
            self.advance(MovieStatus::Playable)?;
        }

        self.tick(scheduler, session_id, &source, movie.duration_secs, movie.progress)
            .await
    }

    /// Reuse the movie's live session or start a new one.
    fn attach_session(&self, movie: &Movie, dest: &Path) -> Result<SessionId> {
        let sessions = &self.services.sessions;
        if let Some(id) = movie.session_id.filter(|id| sessions.get(*id).is_some()) {
            tracing::debug!(movie_id = %self.movie_id, session_id = %id, "Reattached to transfer");
            return Ok(id);
        }

        let id = sessions.start(&movie.descriptor, dest)?;
        movies::set_session(&*self.conn()?, self.movie_id, id)?;
        Ok(id)
    }

    async fn select_media_file(&self, session_id: SessionId) -> anyhow::Result<PathBuf> {
        let sessions = &self.services.sessions;
        let lock = sessions
            .lock(session_id)
            .context("transfer session disappeared")?;
        let _guard = lock.lock().await;
        let handle = sessions
            .get(session_id)
            .context("transfer session disappeared")?;

        handle.set_sequential_mode(true);
        let files = handle.files();
        let listing: Vec<(String, u64)> = files
            .iter()
            .map(|f| (f.relative_path.to_string_lossy().into_owned(), f.size_bytes))
            .collect();
        let index = pick_media_file(&listing).context("transfer contains no files")?;
        Ok(files[index].relative_path.clone())
    }

    async fn transfer_status(&self, session_id: SessionId) -> Option<TransferStatus> {
        let sessions = &self.services.sessions;
        let lock = sessions.lock(session_id)?;
        let _guard = lock.lock().await;
        sessions.get(session_id).map(|handle| handle.status())
    }

    async fn tick(
        &self,
        mut scheduler: ProgressiveScheduler,
        session_id: SessionId,
        source: &Path,
        mut saved_duration: Option<f64>,
        mut saved_progress: f64,
    ) -> anyhow::Result<JobOutcome> {
        let mut ticker = tokio::time::interval(self.services.config.transcode.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seen_seeding = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(movie_id = %self.movie_id, "Job cancelled");
                    return Ok(JobOutcome::Cancelled);
                }
                _ = ticker.tick() => {}
            }

            let status = self.transfer_status(session_id).await;
            if self.cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }
            let (percent, drain) = match status {
                Some(status) => {
                    seen_seeding |= status.is_seeding;
                    (status.percent(), status.is_seeding)
                }
                // Evicted after it finished; the file is complete.
                None if seen_seeding || self.services.sessions.was_evicted(session_id) => {
                    (100.0, true)
                }
                None => bail!("transfer session {} is gone", session_id),
            };

            if (percent - saved_progress).abs() >= 0.01 {
                movies::update_progress(&*self.conn()?, self.movie_id, percent)?;
                saved_progress = percent;
            }

            if !source.exists() {
                if drain {
                    bail!("source file {} never appeared", source.display());
                }
                continue;
            }

            let now = Instant::now();
            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = scheduler.step(percent, drain, now);
                (scheduler, outcome)
            })
            .await?;
            scheduler = returned;
            if self.cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }

            if scheduler.duration() != saved_duration {
                if let Some(duration) = scheduler.duration() {
                    movies::set_duration(&*self.conn()?, self.movie_id, duration)?;
                    saved_duration = Some(duration);
                }
            }

            match outcome {
                StepOutcome::Produced { index } => {
                    tracing::debug!(movie_id = %self.movie_id, segment = index, "Segment ready");
                    self.advance(MovieStatus::Playable)?;
                }
                StepOutcome::Abandoned { index } => {
                    tracing::warn!(movie_id = %self.movie_id, segment = index, "Segment abandoned");
                    movies::set_failed_segments(
                        &*self.conn()?,
                        self.movie_id,
                        &scheduler.failed_segments(),
                    )?;
                }
                StepOutcome::AwaitingDuration if drain => {
                    bail!("duration of {} could not be determined", source.display());
                }
                StepOutcome::Complete => return self.finish(&scheduler),
                StepOutcome::AwaitingDuration
                | StepOutcome::AwaitingProgress { .. }
                | StepOutcome::CoolingDown { .. }
                | StepOutcome::Failed { .. } => {}
            }
        }
    }

    fn finish(&self, scheduler: &ProgressiveScheduler) -> anyhow::Result<JobOutcome> {
        let failed = scheduler.failed_segments();
        if failed.is_empty() {
            self.advance(MovieStatus::Ready)?;
            tracing::info!(movie_id = %self.movie_id, "All segments produced");
            return Ok(JobOutcome::Ready);
        }

        let conn = self.conn()?;
        movies::set_failed_segments(&conn, self.movie_id, &failed)?;
        movies::transition_status(&conn, self.movie_id, MovieStatus::Error)?;
        tracing::error!(
            movie_id = %self.movie_id,
            failed = ?failed,
            "Finished with failed segments"
        );
        Ok(JobOutcome::Failed {
            failed_segments: failed,
        })
    }
}
