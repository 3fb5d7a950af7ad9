//! Byte-range file streaming for direct play.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use seedstream_common::{Error, Result};
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Default read size for streamed bodies.
pub const CHUNK_SIZE: usize = 8192;

/// Parse an HTTP `Range` header against a file of `file_size` bytes.
///
/// Supports `bytes=first-last`, `bytes=first-` and `bytes=-suffix`. The end
/// is clamped to the last byte. Returns `None` for anything malformed or
/// starting at or past the end of the file.
pub fn parse_range_header(header: &str, file_size: u64) -> Option<(u64, u64)> {
    if file_size == 0 {
        return None;
    }
    let spec = header.trim().strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, false) => {
            let suffix_len: u64 = end.parse().ok()?;
            if suffix_len == 0 {
                return None;
            }
            Some((file_size.saturating_sub(suffix_len), file_size - 1))
        }
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            if start >= file_size {
                return None;
            }
            Some((start, file_size - 1))
        }
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            if start >= file_size || start > end {
                return None;
            }
            Some((start, end.min(file_size - 1)))
        }
        (true, true) => None,
    }
}

/// Content type from a file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "ts" => "video/MP2T",
        "m2ts" => "video/mp2t",
        "m3u8" => "application/vnd.apple.mpegurl",
        _ => "application/octet-stream",
    }
}

/// Status, headers and lazy body of a ranged read.
pub struct RangeResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

impl IntoResponse for RangeResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Serves byte ranges of files with partial-content semantics.
#[derive(Debug, Clone, Copy)]
pub struct RangeStreamer {
    chunk_size: usize,
}

impl Default for RangeStreamer {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl RangeStreamer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Open `path` and stream the requested range.
    ///
    /// A valid range yields 206; no range or an unusable one falls back to
    /// the whole file with 200. The body reads `chunk_size` bytes at a time
    /// and ends with an error if a read fails.
    pub async fn stream(&self, path: &Path, range: Option<&str>) -> Result<RangeResponse> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(Error::not_found(format!("file {}", path.display()))),
        };
        let file_size = metadata.len();

        let span = range.and_then(|r| parse_range_header(r, file_size));
        let (status, start, length) = match span {
            Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
            None => (StatusCode::OK, 0, file_size),
        };

        let mut file = File::open(path).await?;
        if start > 0 {
            file.seek(SeekFrom::Start(start)).await?;
        }
        let stream = ReaderStream::with_capacity(file.take(length), self.chunk_size);

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(path)),
        );
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some((start, end)) = span {
            let value = format!("bytes {}-{}/{}", start, end, file_size);
            headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&value).map_err(|e| Error::internal(e.to_string()))?,
            );
        }
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

        Ok(RangeResponse {
            status,
            headers,
            body: Body::from_stream(stream),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_parse_range_header_full_range() {
        assert_eq!(parse_range_header("bytes=100-199", 1000), Some((100, 199)));
    }

    #[test]
    fn test_parse_range_header_open_end() {
        assert_eq!(parse_range_header("bytes=500-", 1000), Some((500, 999)));
    }

    #[test]
    fn test_parse_range_header_suffix() {
        assert_eq!(parse_range_header("bytes=-200", 1000), Some((800, 999)));
        assert_eq!(parse_range_header("bytes=-0", 1000), None);
    }

    #[test]
    fn test_parse_range_header_clamped() {
        assert_eq!(parse_range_header("bytes=0-2000", 1000), Some((0, 999)));
    }

    #[test]
    fn test_parse_range_header_out_of_bounds() {
        assert_eq!(parse_range_header("bytes=1000-", 1000), None);
        assert_eq!(parse_range_header("bytes=1500-1600", 1000), None);
    }

    #[test]
    fn test_parse_range_header_malformed() {
        assert_eq!(parse_range_header("bytes=-", 1000), None);
        assert_eq!(parse_range_header("bytes=abc-def", 1000), None);
        assert_eq!(parse_range_header("items=0-10", 1000), None);
        assert_eq!(parse_range_header("bytes=20-10", 1000), None);
        assert_eq!(parse_range_header("bytes=0-10", 0), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("a.MKV")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("a_segment_000.ts")), "video/MP2T");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    fn sample_file(dir: &Path) -> (std::path::PathBuf, Vec<u8>) {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let path = dir.join("movie.mp4");
        std::fs::write(&path, &data).unwrap();
        (path, data)
    }

    #[tokio::test]
    async fn test_partial_content() {
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = sample_file(dir.path());

        let resp = RangeStreamer::default()
            .stream(&path, Some("bytes=100-199"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers[header::CONTENT_LENGTH], "100");
        assert_eq!(resp.headers[header::CONTENT_RANGE], "bytes 100-199/1000");
        assert_eq!(resp.headers[header::ACCEPT_RANGES], "bytes");

        let body = resp.body.collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], &data[100..200]);
    }

    #[tokio::test]
    async fn test_out_of_bounds_serves_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = sample_file(dir.path());

        let resp = RangeStreamer::default()
            .stream(&path, Some("bytes=1000-"))
            .await
            .unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers[header::CONTENT_LENGTH], "1000");
        assert!(resp.headers.get(header::CONTENT_RANGE).is_none());

        let body = resp.body.collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], &data[..]);
    }

    #[tokio::test]
    async fn test_small_chunks_cover_span() {
        let dir = tempfile::tempdir().unwrap();
        let (path, data) = sample_file(dir.path());

        let resp = RangeStreamer::new(7)
            .stream(&path, Some("bytes=990-"))
            .await
            .unwrap();
        let body = resp.body.collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], &data[990..]);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = RangeStreamer::default()
            .stream(Path::new("/nonexistent/movie.mp4"), None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
