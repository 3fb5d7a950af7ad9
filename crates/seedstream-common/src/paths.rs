//! Path utilities for detecting video files by extension and picking the
//! playable file out of a multi-file transfer.

use std::path::Path;

/// List of supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "m4v", "ts", "webm", "mov", "wmv", "flv",
];

/// Check if a path has a video file extension.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use seedstream_common::paths::is_video_file;
///
/// assert!(is_video_file(Path::new("movie.mkv")));
/// assert!(is_video_file(Path::new("/path/to/video.MP4")));
/// assert!(!is_video_file(Path::new("subtitle.srt")));
/// ```
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Get the list of video file extensions.
#[must_use]
pub fn video_extensions() -> &'static [&'static str] {
    VIDEO_EXTENSIONS
}

/// Pick the main media file from `(relative_path, size)` pairs.
///
/// The largest video file wins; if nothing looks like a video the largest
/// file overall is used.
///
/// # Examples
///
/// ```
/// use seedstream_common::paths::pick_media_file;
///
/// let files = vec![
///     ("Movie/sample.mkv".to_string(), 10),
///     ("Movie/movie.mkv".to_string(), 1_000),
///     ("Movie/extras.zip".to_string(), 5_000),
/// ];
/// assert_eq!(pick_media_file(&files), Some(1));
/// ```
pub fn pick_media_file(files: &[(String, u64)]) -> Option<usize> {
    let largest = |video_only: bool| {
        files
            .iter()
            .enumerate()
            .filter(|(_, (path, _))| !video_only || is_video_file(Path::new(path)))
            .max_by_key(|(_, (_, size))| *size)
            .map(|(index, _)| index)
    };
    largest(true).or_else(|| largest(false))
}
