//! Retention sweep behavior: entries past the 730-day window are hard
//! deleted, newer entries survive byte-for-byte, and cancellation between
//! batches leaves a valid partial state.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::atomic::AtomicBool;
use worktrail_core::event::{AuditEntry, DomainEvent, TaskEvent};
use worktrail_core::store::Store;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
}

fn entry(entity: &str, at: DateTime<Utc>) -> AuditEntry {
    AuditEntry::new(
        entity,
        DomainEvent::Task(TaskEvent::StatusChanged),
        "emp-1",
        at,
        Vec::new(),
        json!({"source": "retention-test"}),
    )
}

#[test]
fn expired_entries_vanish_and_fresh_ones_survive_unchanged() {
    let store = Store::open_in_memory().expect("open store");
    let cancel = AtomicBool::new(false);

    // One entry just past the window, one just inside it.
    let expired = entry("task-old", now() - Duration::days(731));
    let fresh = entry("task-new", now() - Duration::days(729));
    assert!(store.append_entry(&expired).expect("append expired"));
    assert!(store.append_entry(&fresh).expect("append fresh"));

    let outcome = store
        .sweep_expired(now(), 730, 100, &cancel)
        .expect("sweep");
    assert_eq!(outcome.deleted, 1);
    assert!(!outcome.cancelled);

    assert!(
        store
            .trail_for_entity("task-old")
            .expect("trail")
            .is_empty()
    );
    let survivors = store.trail_for_entity("task-new").expect("trail");
    assert_eq!(survivors.len(), 1);
    // Survivor is untouched, content hash included.
    assert_eq!(survivors[0], fresh);
    assert!(survivors[0].hash_valid());
}

#[test]
fn sweep_is_idempotent() {
    let store = Store::open_in_memory().expect("open store");
    let cancel = AtomicBool::new(false);
    store
        .append_entry(&entry("task-old", now() - Duration::days(800)))
        .expect("append");

    let first = store.sweep_expired(now(), 730, 100, &cancel).expect("sweep");
    let second = store.sweep_expired(now(), 730, 100, &cancel).expect("sweep");
    assert_eq!(first.deleted, 1);
    assert_eq!(second.deleted, 0);
}

#[test]
fn cancellation_between_batches_keeps_a_valid_partial_state() {
    let store = Store::open_in_memory().expect("open store");

    for hour in 0..10 {
        store
            .append_entry(&entry(
                "task-old",
                now() - Duration::days(800) + Duration::hours(hour),
            ))
            .expect("append");
    }

    // Cancel flag already set: the sweep stops after its first batch.
    let cancel = AtomicBool::new(true);
    let outcome = store
        .sweep_expired(now(), 730, 3, &cancel)
        .expect("sweep");
    assert!(outcome.cancelled);
    assert_eq!(outcome.deleted, 3);

    // Remaining rows are intact and a later sweep finishes the job.
    let remaining = store.trail_for_entity("task-old").expect("trail");
    assert_eq!(remaining.len(), 7);
    assert!(remaining.iter().all(AuditEntry::hash_valid));

    let cancel = AtomicBool::new(false);
    let rest = store.sweep_expired(now(), 730, 3, &cancel).expect("sweep");
    assert_eq!(rest.deleted, 7);
    assert!(store.trail_for_entity("task-old").expect("trail").is_empty());
}
