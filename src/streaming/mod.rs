//! Playback surface: live playlists, segment delivery and direct play.
//!
//! # Routes
//!
//! Mounted under `/api/video`:
//! - `GET /:id/playlist` - Live HLS playlist (placeholder until segment 0 exists)
//! - `GET /:id/stream_ts?file=<name>` - One MPEG-TS segment
//! - `GET /:id/direct` - Source file with range support
//! - `POST /:id/start` - Find-or-create a movie and launch its job
//! - `GET /:id/status` - Job status and segment availability

pub mod manifest;
pub mod range;
mod video;

pub use manifest::{list_segments, ManifestBuilder};
pub use range::{parse_range_header, RangeResponse, RangeStreamer};
pub use video::{StartRequest, StartResponse, StatusResponse};

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppContext;

/// Create the per-movie playback router.
pub fn video_router() -> Router<AppContext> {
    Router::new()
        .route("/:id/playlist", get(video::playlist))
        .route("/:id/stream_ts", get(video::stream_ts))
        .route("/:id/direct", get(video::direct))
        .route("/:id/start", post(video::start))
        .route("/:id/status", get(video::status))
}
