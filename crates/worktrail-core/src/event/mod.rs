//! Audit trail data model.
//!
//! An [`AuditEntry`] is the immutable record of one classified domain event
//! against one entity. Entries are append-only: created once, never mutated,
//! hard-deleted only by the retention sweep. Entry identity is a BLAKE3 hash
//! of the entry's canonical fields, which makes retried appends idempotent
//! (the store ignores a duplicate hash).

pub mod canonical;
pub mod types;

pub use canonical::canonicalize_json;
pub use types::{DomainEvent, ProjectEvent, TaskEvent, UnknownEventType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One audited field delta carried by an entry.
///
/// Values are stored as JSON so dates, enums, and member lists all fit the
/// same shape. `null` means the field was unset on that side of the diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl FieldChange {
    /// Build a change record from anything serializable.
    ///
    /// Serialization of model types cannot fail; a value that somehow does
    /// is recorded as `null` rather than dropping the change.
    pub fn new<O: Serialize, N: Serialize>(field: &str, old: &O, new: &N) -> Self {
        Self {
            field: field.to_string(),
            old_value: serde_json::to_value(old).unwrap_or(Value::Null),
            new_value: serde_json::to_value(new).unwrap_or(Value::Null),
        }
    }
}

/// Immutable record of one classified domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Kind + id of the entity this entry describes. The entry is owned
    /// referentially: deleting the entity does not delete its trail.
    pub entity_id: String,

    /// The classified event, e.g. `task.approved`.
    pub event: DomainEvent,

    /// Identifier of the user or system actor that caused the mutation.
    pub actor: String,

    /// When the mutation was observed. Trail ordering within one entity is
    /// by this timestamp; no global ordering across entities is promised.
    pub timestamp: DateTime<Utc>,

    /// All audited field deltas observed in the mutation, including ones
    /// whose distinct event classification lost the precedence race.
    pub changes: Vec<FieldChange>,

    /// Free-form event-specific metadata (e.g. `delay_days` on a project
    /// deadline extension).
    #[serde(default)]
    pub metadata: Value,

    /// BLAKE3 content hash (`blake3:<hex>`) of the fields above. Acts as
    /// the entry's identity and the store's idempotency key.
    pub entry_hash: String,
}

impl AuditEntry {
    /// Construct an entry and stamp its content hash.
    #[must_use]
    pub fn new(
        entity_id: &str,
        event: DomainEvent,
        actor: &str,
        timestamp: DateTime<Utc>,
        changes: Vec<FieldChange>,
        metadata: Value,
    ) -> Self {
        let mut entry = Self {
            entity_id: entity_id.to_string(),
            event,
            actor: actor.to_string(),
            timestamp,
            changes,
            metadata,
            entry_hash: String::new(),
        };
        entry.entry_hash = entry.compute_hash();
        entry
    }

    /// Compute the BLAKE3 hash of the entry's canonical fields.
    ///
    /// The hash input is tab-joined: timestamp micros, actor, event name,
    /// entity id, canonical JSON of changes, canonical JSON of metadata.
    /// Deterministic: the same logical entry always hashes identically.
    #[must_use]
    pub fn compute_hash(&self) -> String {
        let changes_json = canonicalize_json(&serde_json::to_value(&self.changes).unwrap_or(
            Value::Array(Vec::new()),
        ));
        let metadata_json = canonicalize_json(&self.metadata);

        let input = format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.timestamp.timestamp_micros(),
            self.actor,
            self.event,
            self.entity_id,
            changes_json,
            metadata_json,
        );

        format!("blake3:{}", blake3::hash(input.as_bytes()).to_hex())
    }

    /// Whether the stored hash still matches the entry's content.
    #[must_use]
    pub fn hash_valid(&self) -> bool {
        self.entry_hash == self.compute_hash()
    }
}
