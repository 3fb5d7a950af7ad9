//! Movie record query operations.
//!
//! CRUD for the `movies` table plus the narrow updates the job runner makes
//! while a transfer is in flight (status, progress, paths, failed segments).

use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use seedstream_common::{Error, MovieId, MovieStatus, Result, SessionId};
use uuid::Uuid;

use crate::models::Movie;

const MOVIE_COLUMNS: &str = "id, external_id, descriptor, session_id, file_path, duration_secs,
     status, progress, failed_segments, last_accessed_at, created_at, updated_at";

fn conversion_error(
    idx: usize,
    e: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn movie_from_row(row: &Row<'_>) -> rusqlite::Result<Movie> {
    let id = Uuid::parse_str(&row.get::<_, String>(0)?).map_err(|e| conversion_error(0, e))?;
    let session_id = row
        .get::<_, Option<String>>(3)?
        .map(|s| Uuid::parse_str(&s).map(SessionId::from))
        .transpose()
        .map_err(|e| conversion_error(3, e))?;
    let status = row
        .get::<_, String>(6)?
        .parse::<MovieStatus>()
        .map_err(|e| conversion_error(6, e))?;
    let failed_segments: Vec<u32> =
        serde_json::from_str(&row.get::<_, String>(8)?).map_err(|e| conversion_error(8, e))?;

    Ok(Movie {
        id: MovieId::from(id),
        external_id: row.get(1)?,
        descriptor: row.get(2)?,
        session_id,
        file_path: row.get(4)?,
        duration_secs: row.get(5)?,
        status,
        progress: row.get(7)?,
        failed_segments,
        last_accessed_at: parse_timestamp(9, row.get(9)?)?,
        created_at: parse_timestamp(10, row.get(10)?)?,
        updated_at: parse_timestamp(11, row.get(11)?)?,
    })
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

/// Ensure an UPDATE touched a row.
fn expect_row(changed: usize, id: MovieId) -> Result<()> {
    if changed == 0 {
        Err(Error::not_found(format!("movie {}", id)))
    } else {
        Ok(())
    }
}

/// Create a new movie record in PENDING state.
pub fn create_movie(conn: &Connection, external_id: &str, descriptor: &str) -> Result<Movie> {
    let id = MovieId::new();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO movies (id, external_id, descriptor, status, progress, failed_segments,
                             last_accessed_at, created_at, updated_at)
         VALUES (?, ?, ?, ?, 0, '[]', ?, ?, ?)",
        params![
            id.to_string(),
            external_id,
            descriptor,
            MovieStatus::Pending.as_str(),
            now.to_rfc3339(),
            now.to_rfc3339(),
            now.to_rfc3339(),
        ],
    )
    .map_err(db_err)?;

    Ok(Movie {
        id,
        external_id: external_id.to_string(),
        descriptor: descriptor.to_string(),
        session_id: None,
        file_path: None,
        duration_secs: None,
        status: MovieStatus::Pending,
        progress: 0.0,
        failed_segments: Vec::new(),
        last_accessed_at: now,
        created_at: now,
        updated_at: now,
    })
}

/// Get a movie by ID.
pub fn get_movie(conn: &Connection, id: MovieId) -> Result<Movie> {
    conn.query_row(
        &format!("SELECT {} FROM movies WHERE id = ?", MOVIE_COLUMNS),
        [id.to_string()],
        movie_from_row,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::not_found(format!("movie {}", id)),
        _ => db_err(e),
    })
}

/// Find a movie by its external id.
pub fn find_by_external_id(conn: &Connection, external_id: &str) -> Result<Option<Movie>> {
    conn.query_row(
        &format!("SELECT {} FROM movies WHERE external_id = ?", MOVIE_COLUMNS),
        [external_id],
        movie_from_row,
    )
    .optional()
    .map_err(db_err)
}

/// Return the movie for `external_id`, creating it if needed.
///
/// The boolean is `true` when a new record was inserted. An existing record
/// keeps its original descriptor.
pub fn get_or_create_movie(
    conn: &Connection,
    external_id: &str,
    descriptor: &str,
) -> Result<(Movie, bool)> {
    match find_by_external_id(conn, external_id)? {
        Some(movie) => Ok((movie, false)),
        None => create_movie(conn, external_id, descriptor).map(|movie| (movie, true)),
    }
}

/// List movies whose status is one of `statuses`, oldest first.
pub fn list_by_status(conn: &Connection, statuses: &[MovieStatus]) -> Result<Vec<Movie>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; statuses.len()].join(", ");
    let sql = format!(
        "SELECT {} FROM movies WHERE status IN ({}) ORDER BY created_at ASC",
        MOVIE_COLUMNS, placeholders
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    let rows = stmt
        .query_map(rusqlite::params_from_iter(names), movie_from_row)
        .map_err(db_err)?;

    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
}

/// Move a movie to `next`, enforcing the status transition table.
///
/// The update is conditional on the status read beforehand, so two writers
/// racing on the same record cannot both succeed.
pub fn transition_status(conn: &Connection, id: MovieId, next: MovieStatus) -> Result<MovieStatus> {
    let current = get_movie(conn, id)?.status;
    current.transition(next)?;

    let changed = conn
        .execute(
            "UPDATE movies SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            params![
                next.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string(),
                current.as_str()
            ],
        )
        .map_err(db_err)?;

    if changed == 0 {
        return Err(Error::database(format!(
            "movie {} changed status concurrently",
            id
        )));
    }
    Ok(next)
}

/// Record a download progress snapshot (percent, clamped to `0..=100`).
pub fn update_progress(conn: &Connection, id: MovieId, progress: f64) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies SET progress = ?, updated_at = ? WHERE id = ?",
            params![
                progress.clamp(0.0, 100.0),
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Attach the transfer session started for this movie.
pub fn set_session(conn: &Connection, id: MovieId, session_id: SessionId) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies SET session_id = ?, updated_at = ? WHERE id = ?",
            params![session_id.to_string(), Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Store the source file path (relative to the media root).
pub fn set_file_path(conn: &Connection, id: MovieId, file_path: &str) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies SET file_path = ?, updated_at = ? WHERE id = ?",
            params![file_path, Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Store the probed duration in seconds.
pub fn set_duration(conn: &Connection, id: MovieId, duration_secs: f64) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies SET duration_secs = ?, updated_at = ? WHERE id = ?",
            params![duration_secs, Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Store the permanently failed segment indices (sorted before writing).
pub fn set_failed_segments(conn: &Connection, id: MovieId, failed: &[u32]) -> Result<()> {
    let mut sorted = failed.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    let json = serde_json::to_string(&sorted).map_err(|e| Error::internal(e.to_string()))?;

    let changed = conn
        .execute(
            "UPDATE movies SET failed_segments = ?, updated_at = ? WHERE id = ?",
            params![json, Utc::now().to_rfc3339(), id.to_string()],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Set the last-accessed timestamp.
pub fn touch_movie(conn: &Connection, id: MovieId, at: DateTime<Utc>) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies SET last_accessed_at = ? WHERE id = ?",
            params![at.to_rfc3339(), id.to_string()],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}

/// Reset a movie to a fresh PENDING record, keeping its identity and descriptor.
pub fn reset_movie(conn: &Connection, id: MovieId) -> Result<()> {
    let changed = conn
        .execute(
            "UPDATE movies
             SET status = ?, progress = 0, session_id = NULL, file_path = NULL,
                 duration_secs = NULL, failed_segments = '[]', updated_at = ?
             WHERE id = ?",
            params![
                MovieStatus::Pending.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string()
            ],
        )
        .map_err(db_err)?;
    expect_row(changed, id)
}
