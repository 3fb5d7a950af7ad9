//! Seedstream - progressive peer-to-peer download to HLS streaming
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod job;
pub mod server;
pub mod streaming;
pub mod transcode;
pub mod transfer;
