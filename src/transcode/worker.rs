//! Cuts one segment at a time.

use seedstream_av::{EncodeMode, MediaToolkit};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Why a segment could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum SegmentError {
    #[error("segment {index} starts past the end of a {duration:.3}s source")]
    OutOfRange { index: u32, duration: f64 },

    #[error("source has no file name: {}", .0.display())]
    NoFileName(PathBuf),

    #[error(transparent)]
    Media(#[from] seedstream_av::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// `<base>_segment_<NNN>.ts`; wider indices keep all their digits.
pub fn segment_file_name(base_name: &str, index: u32) -> String {
    format!("{}_segment_{:03}.ts", base_name, index)
}

/// Source file stem used as the segment base name.
pub fn base_name(source: &Path) -> Option<String> {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
}

/// Directory segments of `source` are written to.
///
/// Mirrors the source's subdirectory beneath `output_dir`; a source outside
/// `output_dir` puts segments directly in it.
pub fn segment_dir(output_dir: &Path, source: &Path) -> PathBuf {
    match source
        .strip_prefix(output_dir)
        .ok()
        .and_then(|rel| rel.parent())
    {
        Some(parent) if !parent.as_os_str().is_empty() => output_dir.join(parent),
        _ => output_dir.to_path_buf(),
    }
}

/// Full path of segment `index` of `source`.
pub fn segment_path(output_dir: &Path, source: &Path, index: u32) -> Option<PathBuf> {
    let base = base_name(source)?;
    Some(segment_dir(output_dir, source).join(segment_file_name(&base, index)))
}

/// Name a segment is encoded under until it validates. Never matches the
/// playlist's segment pattern.
pub fn staging_path(segment: &Path) -> PathBuf {
    let mut name = segment.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// `(start, length)` in seconds of segment `index`, or `None` past the end.
pub fn segment_bounds(index: u32, segment_duration: f64, total_duration: f64) -> Option<(f64, f64)> {
    let start = f64::from(index) * segment_duration;
    if start >= total_duration {
        return None;
    }
    Some((start, segment_duration.min(total_duration - start)))
}

/// Produces single segments through a [`MediaToolkit`].
pub struct TranscodeWorker {
    toolkit: Arc<dyn MediaToolkit>,
    segment_duration: f64,
    mode: Option<EncodeMode>,
}

impl TranscodeWorker {
    pub fn new(toolkit: Arc<dyn MediaToolkit>, segment_duration: f64) -> Self {
        Self {
            toolkit,
            segment_duration,
            mode: None,
        }
    }

    pub fn toolkit(&self) -> &Arc<dyn MediaToolkit> {
        &self.toolkit
    }

    pub fn segment_duration(&self) -> f64 {
        self.segment_duration
    }

    /// Copy when the source is already H.264/AAC in MP4, else re-encode.
    ///
    /// Decided once per job; a failed probe means re-encode.
    pub fn mode_for(&mut self, source: &Path) -> EncodeMode {
        if let Some(mode) = self.mode {
            return mode;
        }

        let mode = match self.toolkit.probe_stream_info(source) {
            Ok(info) if info.is_web_compatible() => EncodeMode::Copy,
            Ok(_) => EncodeMode::Reencode,
            Err(e) => {
                tracing::warn!(source = %source.display(), "Stream probe failed, re-encoding: {}", e);
                EncodeMode::Reencode
            }
        };
        tracing::info!(source = %source.display(), %mode, "Selected segment encode mode");
        self.mode = Some(mode);
        mode
    }

    /// Produce segment `index` and verify it.
    ///
    /// Output is written to a staging name and renamed into place once it
    /// validates, so readers never see a partial segment. Invalid output is
    /// removed before returning an error.
    pub fn produce(
        &mut self,
        source: &Path,
        output_dir: &Path,
        index: u32,
        total_duration: f64,
    ) -> Result<PathBuf, SegmentError> {
        let (start, length) = segment_bounds(index, self.segment_duration, total_duration)
            .ok_or(SegmentError::OutOfRange {
                index,
                duration: total_duration,
            })?;
        let output = segment_path(output_dir, source, index)
            .ok_or_else(|| SegmentError::NoFileName(source.to_path_buf()))?;
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mode = self.mode_for(source);
        let staging = staging_path(&output);
        let result = self
            .toolkit
            .encode_segment(source, start, length, &staging, mode)
            .and_then(|()| self.toolkit.validate(&staging))
            .map_err(SegmentError::from)
            .and_then(|()| std::fs::rename(&staging, &output).map_err(SegmentError::from));

        match result {
            Ok(()) => {
                tracing::info!(
                    segment = index,
                    %mode,
                    path = %output.display(),
                    "Produced segment"
                );
                Ok(output)
            }
            Err(e) => {
                if staging.exists() {
                    if let Err(rm) = std::fs::remove_file(&staging) {
                        tracing::warn!(path = %staging.display(), "Failed to remove invalid segment: {}", rm);
                    }
                }
                Err(e)
            }
        }
    }
}
