//! SQLite event store utilities.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so report queries never block pixel ingestion
//! - `busy_timeout` bounded (see [`DEFAULT_BUSY_TIMEOUT`]); callers on the
//!   pixel path pass a much shorter one so a locked store degrades instead
//!   of stalling the response
//! - `synchronous = NORMAL`

pub mod migrations;
pub mod schema;
pub mod store;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for interactive CLI connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the event store database, apply runtime pragmas, and
/// migrate schema to the latest version.
///
/// # Errors
///
/// Returns an error if opening/configuring/migrating the database fails.
pub fn open_store(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create event store directory {}", parent.display()))?;
    }

    let mut conn = Connection::open(path)
        .with_context(|| format!("open event store {}", path.display()))?;

    configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
    migrations::migrate(&mut conn).context("apply event store migrations")?;

    Ok(conn)
}

/// Open the store only if the database file already exists.
///
/// Read-only commands use this so that a typo'd directory reports
/// "not initialized" instead of silently creating an empty store.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened or migrated.
pub fn try_open_store(path: &Path, busy_timeout: Duration) -> Result<Option<Connection>> {
    if !path.exists() {
        return Ok(None);
    }
    open_store(path, busy_timeout).map(Some)
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, open_store, try_open_store};
    use crate::db::migrations;
    use std::time::Duration;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested/beacon.db");
        (dir, path)
    }

    #[test]
    fn open_store_sets_wal_and_busy_timeout() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());
    }

    #[test]
    fn open_store_honours_short_timeout() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path, Duration::from_millis(250)).expect("open store");
        let busy_timeout_ms: u64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(busy_timeout_ms, 250);
    }

    #[test]
    fn open_store_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let conn = open_store(&path, DEFAULT_BUSY_TIMEOUT).expect("open store");

        let version = migrations::current_schema_version(&conn).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);

        let meta_version: i64 = conn
            .query_row("SELECT schema_version FROM store_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .expect("store_meta schema version");
        assert_eq!(meta_version, i64::from(migrations::LATEST_SCHEMA_VERSION));
    }

    #[test]
    fn try_open_store_skips_missing_file() {
        let (_dir, path) = temp_db_path();
        assert!(
            try_open_store(&path, DEFAULT_BUSY_TIMEOUT)
                .expect("no error for missing file")
                .is_none()
        );
        assert!(!path.exists());
    }
}
