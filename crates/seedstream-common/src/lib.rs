//! Seedstream-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across seedstream:
//!
//! - **Typed IDs**: UUID wrappers for movies and transfer sessions
//! - **Status**: The movie status enum and its transition table
//! - **Path Utilities**: Detect video files by extension
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use seedstream_common::{MovieId, MovieStatus, Error, Result};
//! use seedstream_common::paths::is_video_file;
//! use std::path::Path;
//!
//! let movie_id = MovieId::new();
//!
//! let status = MovieStatus::Pending.transition(MovieStatus::Downloading)?;
//! assert_eq!(status, MovieStatus::Downloading);
//!
//! assert!(is_video_file(Path::new("movie.mkv")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("movie"))
//! }
//! # Ok::<(), Error>(())
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
