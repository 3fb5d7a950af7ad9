//! The encoder/prober seam used by the segment pipeline.

use crate::encode::{self, EncodeMode};
use crate::probe::{self, StreamInfo};
use crate::tools::get_tool_path;
use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Media operations needed to cut progressive segments.
///
/// Implementations are blocking; callers run them off the async runtime.
pub trait MediaToolkit: Send + Sync {
    /// Duration of the (possibly partial) file in seconds.
    fn probe_duration(&self, path: &Path) -> Result<f64>;

    /// Container and codec summary.
    fn probe_stream_info(&self, path: &Path) -> Result<StreamInfo>;

    /// Write `[start, start + length)` of `input` to `output` as MPEG-TS.
    fn encode_segment(
        &self,
        input: &Path,
        start_secs: f64,
        length_secs: f64,
        output: &Path,
        mode: EncodeMode,
    ) -> Result<()>;

    /// Check that `path` is a non-empty file the prober can read.
    fn validate(&self, path: &Path) -> Result<()> {
        let metadata = std::fs::metadata(path).map_err(|_| Error::file_not_found(path))?;
        if metadata.len() == 0 {
            return Err(Error::invalid_output(path, "file is empty"));
        }
        self.probe_stream_info(path)
            .map(|_| ())
            .map_err(|e| Error::invalid_output(path, e.to_string()))
    }
}

/// [`MediaToolkit`] backed by the ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Locate both tools, preferring configured paths over `PATH`.
    pub fn discover(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Result<Self> {
        Ok(Self::new(
            get_tool_path("ffmpeg", ffmpeg)?,
            get_tool_path("ffprobe", ffprobe)?,
        ))
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }
}

impl MediaToolkit for FfmpegToolkit {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        probe::probe_duration(&self.ffprobe, path)
    }

    fn probe_stream_info(&self, path: &Path) -> Result<StreamInfo> {
        probe::probe_stream_info(&self.ffprobe, path)
    }

    fn encode_segment(
        &self,
        input: &Path,
        start_secs: f64,
        length_secs: f64,
        output: &Path,
        mode: EncodeMode,
    ) -> Result<()> {
        encode::encode_segment(&self.ffmpeg, input, start_secs, length_secs, output, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;

    impl MediaToolkit for AcceptAll {
        fn probe_duration(&self, _path: &Path) -> Result<f64> {
            Ok(10.0)
        }

        fn probe_stream_info(&self, _path: &Path) -> Result<StreamInfo> {
            Ok(StreamInfo {
                container: "mpegts".to_string(),
                video_codec: Some("h264".to_string()),
                audio_codec: Some("aac".to_string()),
                duration_secs: Some(10.0),
            })
        }

        fn encode_segment(
            &self,
            _input: &Path,
            _start_secs: f64,
            _length_secs: f64,
            _output: &Path,
            _mode: EncodeMode,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_validate_rejects_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.ts");
        std::fs::write(&path, b"").unwrap();

        let err = AcceptAll.validate(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidOutput { .. }));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = AcceptAll
            .validate(Path::new("/nonexistent/seg.ts"))
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn test_validate_accepts_probeable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.ts");
        std::fs::write(&path, b"\x47payload").unwrap();

        assert!(AcceptAll.validate(&path).is_ok());
    }
}
