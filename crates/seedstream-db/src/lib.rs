//! Seedstream-DB: movie records, migrations, and query operations
//!
//! SQLite via rusqlite with r2d2 connection pooling. One row per movie job;
//! the job runner is the only writer of status and progress.
//!
//! # Modules
//!
//! - `migrations` - Embedded schema migrations, run by the pool
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the schema
//! - `queries` - Query operations
//!
//! # Example
//!
//! ```no_run
//! use seedstream_db::pool::{init_pool, get_conn};
//! use seedstream_db::queries::movies;
//!
//! let pool = init_pool("/var/lib/seedstream/seedstream.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let (movie, created) =
//!     movies::get_or_create_movie(&conn, "tt0111161", "magnet:?xt=urn:btih:abc").unwrap();
//! println!("{} ({}) created={}", movie.id, movie.status, created);
//! ```

mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
