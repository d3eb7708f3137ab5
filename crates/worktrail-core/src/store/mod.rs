//! SQLite-backed engine store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` to allow concurrent readers while writers append
//! - `busy_timeout = 5s` to reduce transient lock failures under contention
//! - `foreign_keys = ON` to protect relational integrity
//!
//! The store owns four concerns, one file each: entity aggregates
//! ([`entities`]), the append-only audit trail ([`trail`]), retention
//! sweeping ([`sweep`]), and aggregation output plus its run-lock
//! ([`snapshots`]).

pub mod entities;
pub mod migrations;
pub mod schema;
pub mod snapshots;
pub mod sweep;
pub mod trail;

pub use sweep::{SweepLock, SweepLockError, SweepOutcome};
pub use trail::Pagination;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A handle to the engine store. One connection, single writer.
#[derive(Debug)]
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (or create) the store at `path`, apply runtime pragmas, and
    /// migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;

        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;

        Ok(Self { conn })
    }

    /// Open an in-memory store with the full schema. Used by tests and by
    /// callers that only need a scratch trail.
    ///
    /// # Errors
    ///
    /// Returns an error if schema migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for read-only statements.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

/// Convert an optional timestamp to its persisted micros form.
pub(crate) fn opt_us(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|ts| ts.timestamp_micros())
}

/// Convert persisted micros back to a timestamp, dropping out-of-range rows
/// to `None` rather than panicking on corrupt data.
pub(crate) fn opt_ts(value: Option<i64>) -> Option<DateTime<Utc>> {
    value.and_then(DateTime::<Utc>::from_timestamp_micros)
}

/// Convert required micros back to a timestamp, substituting the epoch for
/// out-of-range values.
pub(crate) fn req_ts(value: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(value).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, Store, migrations};
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("worktrail.sqlite3");
        (dir, path)
    }

    #[test]
    fn open_sets_wal_busy_timeout_and_fk() {
        let (_dir, path) = temp_db_path();
        let store = Store::open(&path).expect("open store");

        let journal_mode: String = store
            .conn()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = store
            .conn()
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(u128::from(busy_timeout_ms), DEFAULT_BUSY_TIMEOUT.as_millis());

        let foreign_keys: i64 = store
            .conn()
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn open_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let store = Store::open(&path).expect("open store");

        let version =
            migrations::current_schema_version(store.conn()).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn in_memory_store_has_full_schema() {
        let store = Store::open_in_memory().expect("open in-memory store");
        let version =
            migrations::current_schema_version(store.conn()).expect("schema version query");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }
}
