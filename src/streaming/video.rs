//! Per-movie playback routes: playlist, segments, direct play, start and
//! status.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use seedstream_common::{Error, MovieId, MovieStatus};
use seedstream_db::models::Movie;
use seedstream_db::pool::get_conn;
use seedstream_db::queries::movies;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::manifest::{list_segments, ManifestBuilder};
use crate::job::{movie_dir, retention, run_blocking, spawn_job};
use crate::server::{AppContext, AppError};
use crate::transcode::{base_name, segment_dir};
use crate::transfer::normalize_descriptor;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/MP2T";

fn parse_id(raw: &str) -> Result<MovieId, AppError> {
    raw.parse()
        .map_err(|_| AppError::not_found(format!("Movie {} not found", raw)))
}

async fn fetch_movie(ctx: &AppContext, id: MovieId) -> Result<Movie, AppError> {
    let pool = ctx.jobs.pool.clone();
    Ok(run_blocking(move || movies::get_movie(&*get_conn(&pool)?, id)).await?)
}

/// Source file and segment directory of a movie with a known file.
struct MovieFiles {
    source: PathBuf,
    segments: PathBuf,
    base_name: String,
}

impl MovieFiles {
    fn of(ctx: &AppContext, movie: &Movie) -> Option<Self> {
        let media_root = &ctx.config.server.media_root;
        let source = media_root.join(movie.file_path.as_deref()?);
        let base_name = base_name(&source)?;
        let segments = segment_dir(&movie_dir(media_root, movie.id), &source);
        Some(Self {
            source,
            segments,
            base_name,
        })
    }
}

fn no_cache(headers: &mut HeaderMap) {
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
}

/// `GET /video/:id/playlist`
///
/// Always answers 200; anything not ready yet gets the placeholder.
pub async fn playlist(State(ctx): State<AppContext>, Path(id): Path<String>) -> Response {
    let rendered = {
        let ctx = ctx.clone();
        let id = id.clone();
        run_blocking(move || render_playlist(&ctx, &id)).await
    };
    let body = match rendered {
        Ok(Some(body)) => body,
        Ok(None) => ManifestBuilder::placeholder(),
        Err(e) => {
            tracing::warn!(movie_id = %id, "Serving placeholder playlist: {}", e);
            ManifestBuilder::placeholder()
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PLAYLIST_CONTENT_TYPE),
    );
    no_cache(&mut headers);
    (StatusCode::OK, headers, body).into_response()
}

fn render_playlist(ctx: &AppContext, raw_id: &str) -> seedstream_common::Result<Option<String>> {
    let Ok(id) = raw_id.parse::<MovieId>() else {
        return Ok(None);
    };
    let movie = match retention::load_and_touch(&ctx.jobs, id) {
        Ok(movie) => movie,
        Err(Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    let Some(files) = MovieFiles::of(ctx, &movie) else {
        return Ok(None);
    };

    let finished = movie.status.is_terminal();
    let builder = ManifestBuilder::new(
        ctx.config.transcode.segment_duration_secs,
        format!(
            "{}/video/{}/stream_ts?file=",
            ctx.config.streaming.public_prefix.trim_end_matches('/'),
            movie.id
        ),
    );
    Ok(Some(builder.build(&files.segments, &files.base_name, finished)))
}

#[derive(Debug, Deserialize)]
pub struct SegmentQuery {
    pub file: Option<String>,
}

/// A single path component with no separators or dot entries.
fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// `GET /video/:id/stream_ts?file=<name>`
pub async fn stream_ts(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Query(query): Query<SegmentQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let name = query
        .file
        .filter(|name| is_plain_file_name(name))
        .ok_or_else(|| AppError::not_found("Segment not found"))?;
    let id = parse_id(&id)?;

    let movie = fetch_movie(&ctx, id).await?;
    let files =
        MovieFiles::of(&ctx, &movie).ok_or_else(|| AppError::not_found("Segment not found"))?;
    let path = files.segments.join(&name);
    if !tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        return Err(AppError::not_found("Segment not found"));
    }

    if let Some(prefix) = &ctx.config.streaming.accel_redirect_prefix {
        return accel_redirect(&ctx, prefix, &path);
    }

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let mut response = ctx.streamer.stream(&path, range).await?;
    response.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(SEGMENT_CONTENT_TYPE),
    );
    Ok(response.into_response())
}

/// Hand the transfer of `path` to the reverse proxy.
fn accel_redirect(
    ctx: &AppContext,
    prefix: &str,
    path: &std::path::Path,
) -> Result<Response, AppError> {
    let relative = path
        .strip_prefix(&ctx.config.server.media_root)
        .map_err(|_| AppError::not_found("Segment not found"))?;
    let components: Vec<String> = relative
        .components()
        .map(|c| urlencoding::encode(&c.as_os_str().to_string_lossy()).into_owned())
        .collect();
    let target = format!("{}/{}", prefix.trim_end_matches('/'), components.join("/"));

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(SEGMENT_CONTENT_TYPE),
    );
    headers.insert(
        "X-Accel-Redirect",
        HeaderValue::from_str(&target)
            .map_err(|e| AppError::from(Error::internal(e.to_string())))?,
    );
    Ok((StatusCode::OK, headers).into_response())
}

/// `GET /video/:id/direct`: the source file itself, with range support.
pub async fn direct(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let movie = fetch_movie(&ctx, id).await?;
    let files = MovieFiles::of(&ctx, &movie)
        .ok_or_else(|| AppError::not_found("Movie has no media file yet"))?;

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let response = ctx.streamer.stream(&files.source, range).await?;
    Ok(response.into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    #[serde(default, alias = "magnet_link")]
    pub magnet_or_descriptor: Option<String>,
    #[serde(default, alias = "imdb_id")]
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub status: MovieStatus,
    pub id: MovieId,
}

fn required(field: Option<String>, name: &str) -> Result<String, AppError> {
    field
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(format!("{} is required", name)))
}

/// `POST /video/:id/start`
///
/// The movie is found or created by external id; the path id is ignored.
pub async fn start(
    State(ctx): State<AppContext>,
    Path(_id): Path<String>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    let descriptor = normalize_descriptor(&required(
        request.magnet_or_descriptor,
        "magnetOrDescriptor",
    )?);
    let external_id = required(request.external_id, "externalId")?;

    let jobs = ctx.jobs.clone();
    let movie = run_blocking(move || {
        let (movie, created) =
            movies::get_or_create_movie(&*get_conn(&jobs.pool)?, &external_id, &descriptor)?;
        if created {
            tracing::info!(movie_id = %movie.id, external_id = %external_id, "Movie registered");
        }
        retention::load_and_touch(&jobs, movie.id)
    })
    .await?;
    let needs_runner = movie.status == MovieStatus::Pending
        || (movie.status.is_in_flight() && !ctx.jobs.registry.is_running(movie.id));

    let status = if needs_runner {
        spawn_job(&ctx.jobs, movie.id).await?;
        fetch_movie(&ctx, movie.id).await?.status
    } else {
        movie.status
    };

    Ok(Json(StartResponse {
        status,
        id: movie.id,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: MovieStatus,
    pub progress: f64,
    pub file_path: Option<String>,
    pub ready: bool,
    pub downloading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_segments: Option<Vec<u32>>,
}

/// `GET /video/:id/status`
pub async fn status(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, AppError> {
    let id = parse_id(&id)?;
    let jobs = ctx.jobs.clone();
    let movie = run_blocking(move || retention::load_and_touch(&jobs, id)).await?;

    let mut response = StatusResponse {
        status: movie.status,
        progress: movie.progress,
        file_path: movie.file_path.clone(),
        ready: movie.status.is_ready(),
        downloading: movie.status.is_downloading(),
        available_segments: None,
        total_duration: None,
        segment_duration: None,
        failed_segments: None,
    };

    if movie.status.is_ready() {
        if let Some(files) = MovieFiles::of(&ctx, &movie) {
            let listed =
                run_blocking(move || Ok(list_segments(&files.segments, &files.base_name).len()))
                    .await?;
            response.available_segments = Some(listed);
        }
        response.total_duration = movie.duration_secs;
        response.segment_duration = Some(ctx.config.transcode.segment_duration_secs);
    }
    if !movie.failed_segments.is_empty() {
        response.failed_segments = Some(movie.failed_segments);
    }

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("Movie_segment_000.ts"));
        assert!(is_plain_file_name("a b.ts"));
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("../secret.ts"));
        assert!(!is_plain_file_name("dir/file.ts"));
        assert!(!is_plain_file_name("dir\\file.ts"));
    }

    #[test]
    fn test_start_request_aliases() {
        let request: StartRequest =
            serde_json::from_str(r#"{"magnetOrDescriptor":"magnet:?x","externalId":"tt1"}"#)
                .unwrap();
        assert_eq!(request.magnet_or_descriptor.as_deref(), Some("magnet:?x"));
        assert_eq!(request.external_id.as_deref(), Some("tt1"));

        let request: StartRequest =
            serde_json::from_str(r#"{"magnet_link":"magnet:?x","imdb_id":"tt1"}"#).unwrap();
        assert_eq!(request.magnet_or_descriptor.as_deref(), Some("magnet:?x"));
        assert_eq!(request.external_id.as_deref(), Some("tt1"));
    }

    #[test]
    fn test_required_rejects_blank() {
        assert!(required(None, "externalId").is_err());
        assert!(required(Some("   ".into()), "externalId").is_err());
        assert_eq!(required(Some(" tt1 ".into()), "externalId").unwrap(), "tt1");
    }

    #[test]
    fn test_status_response_omits_absent_fields() {
        let response = StatusResponse {
            status: MovieStatus::Downloading,
            progress: 12.5,
            file_path: None,
            ready: false,
            downloading: true,
            available_segments: None,
            total_duration: None,
            segment_duration: None,
            failed_segments: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "DOWNLOADING");
        assert_eq!(json["filePath"], serde_json::Value::Null);
        assert!(json.get("availableSegments").is_none());
        assert!(json.get("failedSegments").is_none());
    }
}
