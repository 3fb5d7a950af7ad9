//! ffprobe-based probing.
//!
//! Only what segment production needs: the container duration and the
//! codecs that decide between stream copy and re-encode.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    format_name: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
}

/// Container and codec summary of a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// ffprobe `format_name`, e.g. `mov,mp4,m4a,3gp,3g2,mj2`.
    pub container: String,
    /// Codec of the first video stream.
    pub video_codec: Option<String>,
    /// Codec of the first audio stream.
    pub audio_codec: Option<String>,
    /// Container duration in seconds, when known.
    pub duration_secs: Option<f64>,
}

impl StreamInfo {
    /// True when segments can be cut with stream copy: an MP4-family
    /// container carrying H.264 video and AAC audio.
    pub fn is_web_compatible(&self) -> bool {
        let mp4 = self.container.to_lowercase().contains("mp4");
        let h264 = matches!(self.video_codec.as_deref(), Some("h264") | Some("avc1"));
        let aac = matches!(self.audio_codec.as_deref(), Some("aac"));
        mp4 && h264 && aac
    }
}

fn run_ffprobe(ffprobe: &Path, path: &Path) -> Result<FfprobeOutput> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.trim().to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    Ok(serde_json::from_str(&json_str)?)
}

/// Parse ffprobe JSON output into a [`StreamInfo`].
pub fn parse_stream_info(json: &str) -> Result<StreamInfo> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    stream_info_from(output)
}

fn stream_info_from(output: FfprobeOutput) -> Result<StreamInfo> {
    let format = output
        .format
        .ok_or_else(|| Error::parse_error("ffprobe", "missing format section"))?;

    let first_codec = |kind: &str| {
        output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(kind))
            .and_then(|s| s.codec_name.clone())
    };

    Ok(StreamInfo {
        video_codec: first_codec("video"),
        audio_codec: first_codec("audio"),
        container: format.format_name,
        duration_secs: format
            .duration
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0),
    })
}

/// Probe container and codecs.
pub fn probe_stream_info(ffprobe: &Path, path: &Path) -> Result<StreamInfo> {
    stream_info_from(run_ffprobe(ffprobe, path)?)
}

/// Probe the container duration in seconds.
///
/// A partially downloaded file often has no usable duration yet; that is a
/// `ParseError`, not a panic.
pub fn probe_duration(ffprobe: &Path, path: &Path) -> Result<f64> {
    probe_stream_info(ffprobe, path)?
        .duration_secs
        .ok_or_else(|| Error::parse_error("ffprobe", format!("no duration for {}", path.display())))
}
