//! Append-only audit trail persistence.
//!
//! Appends are idempotent: the entry's content hash is the primary key and a
//! duplicate append is ignored, which is what makes the interceptor's
//! at-least-once retry safe. Ordering is promised only within one entity's
//! trail, by timestamp.

use crate::event::{AuditEntry, DomainEvent, FieldChange};
use crate::store::{Store, req_ts};
use rusqlite::{Row, params, types::Type};
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;

/// Offset pagination echoed back by trail queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Build the echo for a query over `total` rows. Page and limit are
    /// clamped to at least 1.
    #[must_use]
    pub fn for_total(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = u32::try_from(total.div_ceil(u64::from(limit))).unwrap_or(u32::MAX);
        Self {
            page: page.max(1),
            limit,
            total,
            total_pages,
        }
    }
}

fn decode_error(index: usize, error: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let event_raw: String = row.get("event_type")?;
    let changes_json: String = row.get("changes_json")?;
    let metadata_json: String = row.get("metadata_json")?;

    let event = DomainEvent::from_str(&event_raw).map_err(|error| decode_error(3, error))?;
    let changes: Vec<FieldChange> =
        serde_json::from_str(&changes_json).map_err(|error| decode_error(6, error))?;
    let metadata: Value =
        serde_json::from_str(&metadata_json).map_err(|error| decode_error(7, error))?;

    Ok(AuditEntry {
        entity_id: row.get("entity_id")?,
        event,
        actor: row.get("actor")?,
        timestamp: req_ts(row.get("ts_us")?),
        changes,
        metadata,
        entry_hash: row.get("entry_hash")?,
    })
}

const ENTRY_COLUMNS: &str =
    "entry_hash, entity_kind, entity_id, event_type, actor, ts_us, changes_json, metadata_json";

impl Store {
    /// Append one entry. Returns `false` when an entry with the same content
    /// hash already exists (retried append, nothing written).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or a JSON column fails to encode.
    pub fn append_entry(&self, entry: &AuditEntry) -> rusqlite::Result<bool> {
        let changes_json =
            serde_json::to_string(&entry.changes).map_err(|error| decode_error(6, error))?;
        let metadata_json =
            serde_json::to_string(&entry.metadata).map_err(|error| decode_error(7, error))?;

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO audit_entries
                 (entry_hash, entity_kind, entity_id, event_type, actor, ts_us,
                  changes_json, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.entry_hash,
                entry.event.entity_kind(),
                entry.entity_id,
                entry.event.as_str(),
                entry.actor,
                entry.timestamp.timestamp_micros(),
                changes_json,
                metadata_json,
            ],
        )?;
        Ok(inserted == 1)
    }

    /// One page of an entity's trail, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn timeline(
        &self,
        entity_id: &str,
        page: u32,
        limit: u32,
    ) -> rusqlite::Result<(Vec<AuditEntry>, Pagination)> {
        let total: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM audit_entries WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        let pagination = Pagination::for_total(page, limit, total);
        let offset = u64::from(pagination.page - 1) * u64::from(pagination.limit);

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_entries
             WHERE entity_id = ?1
             ORDER BY ts_us DESC, entry_hash
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![entity_id, pagination.limit, offset],
            |row| entry_from_row(row),
        )?;
        Ok((rows.collect::<rusqlite::Result<Vec<_>>>()?, pagination))
    }

    /// An entity's full trail in replay order (oldest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn trail_for_entity(&self, entity_id: &str) -> rusqlite::Result<Vec<AuditEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_entries
             WHERE entity_id = ?1
             ORDER BY ts_us ASC, entry_hash"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![entity_id], |row| entry_from_row(row))?;
        rows.collect()
    }

    /// One page of an actor's activity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row fails to decode.
    pub fn actor_activity(
        &self,
        actor: &str,
        page: u32,
        limit: u32,
    ) -> rusqlite::Result<(Vec<AuditEntry>, Pagination)> {
        let total: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM audit_entries WHERE actor = ?1",
            params![actor],
            |row| row.get(0),
        )?;
        let pagination = Pagination::for_total(page, limit, total);
        let offset = u64::from(pagination.page - 1) * u64::from(pagination.limit);

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM audit_entries
             WHERE actor = ?1
             ORDER BY ts_us DESC, entry_hash
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![actor, pagination.limit, offset], |row| {
            entry_from_row(row)
        })?;
        Ok((rows.collect::<rusqlite::Result<Vec<_>>>()?, pagination))
    }

    /// Total entries in the trail, all entities. Used by sweep tests and
    /// operator tooling.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn trail_len(&self) -> rusqlite::Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_entries", [], |row| row.get(0))
    }
}
