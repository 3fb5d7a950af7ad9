//! Database query operations.

pub mod movies;
