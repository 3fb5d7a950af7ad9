//! Embedded schema migrations.
//!
//! The applied version lives in SQLite's `user_version` header field, so no
//! bookkeeping table is needed.

use rusqlite::Connection;
use seedstream_common::{Error, Result};

/// Schema steps in order; running step `n` leaves the schema at version `n + 1`.
const STEPS: &[&str] = &[include_str!("001_initial.sql")];

fn schema_version(conn: &Connection) -> rusqlite::Result<usize> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(usize::try_from(version).unwrap_or(0))
}

fn apply(conn: &Connection, version: usize, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", version as i64)?;
    tx.commit()
}

/// Bring the schema up to date. Returns the number of steps applied.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    let current = schema_version(conn).map_err(|e| Error::database(e.to_string()))?;

    let mut applied = 0;
    for (index, sql) in STEPS.iter().enumerate().skip(current) {
        let version = index + 1;
        apply(conn, version, sql)
            .map_err(|e| Error::database(format!("migration {} failed: {}", version, e)))?;
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), STEPS.len());
        assert_eq!(schema_version(&conn).unwrap(), STEPS.len());
        assert_eq!(run_migrations(&conn).unwrap(), 0);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='movies'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn test_newer_schema_is_left_alone() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", 99i64).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }
}
