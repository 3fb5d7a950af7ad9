//! # seedstream-av
//!
//! ffprobe/ffmpeg wrapper used to cut a growing media file into
//! independently playable MPEG-TS segments.
//!
//! - [`probe`]: duration and codec detection
//! - [`encode`]: one segment via stream copy or re-encode
//! - [`MediaToolkit`]: the trait the pipeline is written against, with
//!   [`FfmpegToolkit`] as the CLI-backed implementation
//! - [`tools`]: executable discovery
//!
//! ## Example
//!
//! ```no_run
//! use seedstream_av::{EncodeMode, FfmpegToolkit, MediaToolkit};
//! use std::path::Path;
//!
//! let toolkit = FfmpegToolkit::discover(None, None)?;
//! let source = Path::new("/media/movie.mkv");
//! let info = toolkit.probe_stream_info(source)?;
//! let mode = if info.is_web_compatible() { EncodeMode::Copy } else { EncodeMode::Reencode };
//! toolkit.encode_segment(source, 0.0, 10.0, Path::new("/media/movie_segment_000.ts"), mode)?;
//! # Ok::<(), seedstream_av::Error>(())
//! ```

mod error;
pub mod encode;
pub mod probe;
pub mod toolkit;
pub mod tools;

// Re-exports
pub use encode::EncodeMode;
pub use error::{Error, Result};
pub use probe::StreamInfo;
pub use toolkit::{FfmpegToolkit, MediaToolkit};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};
