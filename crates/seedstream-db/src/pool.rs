//! r2d2 pool over SQLite, migrated on creation.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use seedstream_common::{Error, Result};

use crate::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Runners write while request handlers read.
const FILE_POOL_SIZE: u32 = 4;

fn build(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::database(format!("Failed to create connection pool: {}", e)))?;
    run_migrations(&*get_conn(&pool)?)?;
    Ok(pool)
}

/// Open (or create) the database at `db_path` in WAL mode.
///
/// ```no_run
/// let pool = seedstream_db::pool::init_pool("/var/lib/seedstream/seedstream.db").unwrap();
/// ```
pub fn init_pool(db_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
    });
    build(manager, FILE_POOL_SIZE)
}

/// Single-connection in-memory database for tests.
///
/// Each in-memory connection is a separate database, hence one connection.
pub fn init_memory_pool() -> Result<DbPool> {
    build(SqliteConnectionManager::memory(), 1)
}

pub fn get_conn(pool: &DbPool) -> Result<PooledConnection> {
    pool.get()
        .map_err(|e| Error::database(format!("Failed to get connection from pool: {}", e)))
}
