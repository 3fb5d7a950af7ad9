//! Access tracking and expiry of unwatched media.
//!
//! Every read through the HTTP surface refreshes a movie's last-accessed
//! time. A movie not accessed within the retention window loses its media
//! directory and goes back to PENDING before the refresh.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use seedstream_common::{MovieId, Result};
use seedstream_db::models::Movie;
use seedstream_db::pool::get_conn;
use seedstream_db::queries::movies;

use super::{movie_dir, JobServices};

/// Whether a movie last accessed at `last_accessed` has expired at `now`.
pub fn is_stale(last_accessed: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now - last_accessed > window
}

/// Load a movie for a client request, expiring it first if stale, and
/// refresh its last-accessed time.
pub fn load_and_touch(services: &JobServices, id: MovieId) -> Result<Movie> {
    let conn = get_conn(&services.pool)?;
    let movie = movies::get_movie(&conn, id)?;
    let now = Utc::now();

    if is_stale(
        movie.last_accessed_at,
        now,
        services.config.retention.stale_after(),
    ) {
        expire(services, &conn, &movie)?;
    }

    movies::touch_movie(&conn, id, now)?;
    movies::get_movie(&conn, id)
}

fn expire(services: &JobServices, conn: &Connection, movie: &Movie) -> Result<()> {
    tracing::info!(
        movie_id = %movie.id,
        last_accessed = %movie.last_accessed_at,
        "Movie not accessed within retention window, resetting"
    );

    services.registry.cancel(movie.id);
    if let Some(session_id) = movie.session_id {
        if let Err(e) = services.sessions.stop(session_id) {
            tracing::warn!(movie_id = %movie.id, "Failed to stop transfer: {}", e);
        }
    }

    let dir = movie_dir(&services.config.server.media_root, movie.id);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => tracing::debug!(path = %dir.display(), "Removed media directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    movies::reset_movie(conn, movie.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_stale() {
        let now = Utc::now();
        let window = Duration::days(30);

        assert!(!is_stale(now - Duration::days(29), now, window));
        assert!(!is_stale(now - Duration::days(30), now, window));
        assert!(is_stale(now - Duration::days(31), now, window));
    }
}
