//! Single-segment encoding with ffmpeg.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// How a segment is produced from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMode {
    /// Stream copy; source is already H.264/AAC.
    Copy,
    /// Re-encode to H.264 (`ultrafast`) and AAC.
    Reencode,
}

impl EncodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Reencode => "reencode",
        }
    }
}

impl std::fmt::Display for EncodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the ffmpeg argument list for one MPEG-TS segment.
///
/// Seeking happens on the input side so ffmpeg never decodes the prefix.
/// `-output_ts_offset` keeps timestamps continuous across segments.
pub fn segment_args(
    input: &Path,
    start_secs: f64,
    length_secs: f64,
    output: &Path,
    mode: EncodeMode,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        format!("{:.3}", start_secs),
        "-t".to_string(),
        format!("{:.3}", length_secs),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
    ];

    match mode {
        EncodeMode::Copy => {
            args.extend(["-c".to_string(), "copy".to_string()]);
        }
        EncodeMode::Reencode => {
            args.extend([
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                "ultrafast".to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-ac".to_string(),
                "2".to_string(),
            ]);
        }
    }

    args.extend([
        "-output_ts_offset".to_string(),
        format!("{:.3}", start_secs),
        "-f".to_string(),
        "mpegts".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]);

    args
}

/// Run ffmpeg to produce one segment.
///
/// Only checks the exit status; validating the produced file is the
/// caller's job.
pub fn encode_segment(
    ffmpeg: &Path,
    input: &Path,
    start_secs: f64,
    length_secs: f64,
    output: &Path,
    mode: EncodeMode,
) -> Result<()> {
    if !input.exists() {
        return Err(Error::file_not_found(input));
    }

    let args = segment_args(input, start_secs, length_secs, output, mode);
    tracing::debug!(?args, "Running ffmpeg");

    let output = Command::new(ffmpeg).args(&args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::tool_not_found("ffmpeg")
        } else {
            Error::Io(e)
        }
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed(
            "ffmpeg",
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(())
}
