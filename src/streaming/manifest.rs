//! Live HLS playlist synthesis.
//!
//! The playlist is re-derived from the segment files on disk on every call.
//! While the job runs the playlist is an `EVENT` playlist that players keep
//! polling; once finished it becomes `VOD` with an end marker.

use regex::Regex;
use std::path::Path;

/// Target duration advertised while nothing is ready, so players poll often.
const PLACEHOLDER_TARGET_DURATION: u32 = 2;

/// Segment files for `base_name` in `dir`, sorted by index.
///
/// A missing or unreadable directory yields no segments.
pub fn list_segments(dir: &Path, base_name: &str) -> Vec<(u32, String)> {
    let Ok(pattern) = Regex::new(&format!(r"^{}_segment_(\d+)\.ts$", regex::escape(base_name)))
    else {
        return Vec::new();
    };
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut segments: Vec<(u32, String)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let index = pattern.captures(&name)?.get(1)?.as_str().parse().ok()?;
            Some((index, name))
        })
        .collect();

    segments.sort_by_key(|(index, _)| *index);
    segments
}

/// Builds media playlists for one segment duration and URI prefix.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    segment_duration: u32,
    uri_prefix: String,
}

impl ManifestBuilder {
    /// `uri_prefix` is prepended to each URL-encoded segment file name,
    /// e.g. `/api/video/<id>/stream_ts?file=`.
    pub fn new(segment_duration: u32, uri_prefix: impl Into<String>) -> Self {
        Self {
            segment_duration,
            uri_prefix: uri_prefix.into(),
        }
    }

    /// Playlist telling the player nothing is ready yet.
    pub fn placeholder() -> String {
        let lines = [
            "#EXTM3U".to_string(),
            "#EXT-X-VERSION:3".to_string(),
            format!("#EXT-X-TARGETDURATION:{}", PLACEHOLDER_TARGET_DURATION),
            "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
            "#EXT-X-PLAYLIST-TYPE:EVENT".to_string(),
        ];
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }

    /// Playlist for the segments of `base_name` currently in `dir`.
    pub fn build(&self, dir: &Path, base_name: &str, finished: bool) -> String {
        let segments = list_segments(dir, base_name);
        if segments.is_empty() {
            return Self::placeholder();
        }

        let mut lines = vec![
            "#EXTM3U".to_string(),
            "#EXT-X-VERSION:3".to_string(),
            format!("#EXT-X-TARGETDURATION:{}", self.segment_duration),
            "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
            format!(
                "#EXT-X-PLAYLIST-TYPE:{}",
                if finished { "VOD" } else { "EVENT" }
            ),
        ];
        if !finished {
            lines.push("#EXT-X-START:TIME-OFFSET=0,PRECISE=YES".to_string());
        }

        for (_, name) in &segments {
            lines.push(format!("#EXTINF:{:.1},", f64::from(self.segment_duration)));
            lines.push(format!("{}{}", self.uri_prefix, urlencoding::encode(name)));
        }

        if finished {
            lines.push("#EXT-X-ENDLIST".to_string());
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
