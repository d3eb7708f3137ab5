//! Mutation interception and audit emission.
//!
//! The interceptor is an explicit step at the service boundary, not a
//! persistence hook: callers (the workflow machine here, the HTTP layer in
//! the full system) capture a pre-image of the audited fields, apply their
//! write, then hand both images over. Classification plus append happen
//! after the primary write committed and are best-effort — an audit failure
//! is logged and swallowed, never surfaced to the mutation's caller.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::classify::{Classification, ProjectImage, TaskImage, classify_project, classify_task};
use crate::error::ErrorCode;
use crate::event::AuditEntry;
use crate::store::Store;

/// Caller-supplied context for one mutation.
#[derive(Debug, Clone)]
pub struct MutationContext {
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    /// Request-scoped metadata (correlation id, origin, ...). Merged into
    /// the classified event's own metadata.
    pub metadata: Value,
}

impl MutationContext {
    #[must_use]
    pub fn new(actor: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            actor: actor.to_string(),
            timestamp,
            metadata: Value::Null,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Classify a task mutation and append the resulting entry. Returns the
/// entry that was (or would have been) appended, for callers that want it;
/// an audit-store failure is logged and swallowed, never surfaced.
pub fn record_task_mutation(
    store: &Store,
    task_id: &str,
    context: &MutationContext,
    pre: Option<&TaskImage>,
    post: &TaskImage,
) -> Option<AuditEntry> {
    let classification = classify_task(pre, post)?;
    append_classified(store, task_id, context, classification)
}

/// Classify a project mutation and append the resulting entry. Same
/// contract as [`record_task_mutation`].
pub fn record_project_mutation(
    store: &Store,
    project_id: &str,
    context: &MutationContext,
    pre: Option<&ProjectImage>,
    post: &ProjectImage,
) -> Option<AuditEntry> {
    let classification = classify_project(pre, post)?;
    append_classified(store, project_id, context, classification)
}

fn append_classified(
    store: &Store,
    entity_id: &str,
    context: &MutationContext,
    classification: Classification,
) -> Option<AuditEntry> {
    let metadata = merge_metadata(classification.metadata, &context.metadata);
    let entry = AuditEntry::new(
        entity_id,
        classification.event,
        &context.actor,
        context.timestamp,
        classification.changes,
        metadata,
    );

    match store.append_entry(&entry) {
        Ok(_appended) => Some(entry),
        Err(error) => {
            // The primary mutation already committed; audit is best-effort.
            warn!(
                code = ErrorCode::AuditWriteFailed.code(),
                entity_id,
                event = %entry.event,
                %error,
                "audit append failed; entry dropped"
            );
            Some(entry)
        }
    }
}

/// Merge request metadata into the event's own metadata. Event-specific keys
/// win on collision; a null side yields the other unchanged.
fn merge_metadata(event_meta: Value, request_meta: &Value) -> Value {
    match (event_meta, request_meta) {
        (Value::Null, request) => request.clone(),
        (event, Value::Null) => event,
        (Value::Object(event), Value::Object(request)) => {
            let mut merged = request.clone();
            for (key, value) in event {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        // Non-object request metadata cannot be merged; the event's wins.
        (event, _) => event,
    }
}
