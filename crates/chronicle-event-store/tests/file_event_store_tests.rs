//! Integration tests for `FileEventStore`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use chronicle_core::error::EventStoreError;
use chronicle_core::event::{EventQuery, NewDomainEvent};
use chronicle_core::repository::EventStore;
use chronicle_event_store::FileEventStore;
use chronicle_test_support::FixedClock;
use serde_json::{Map, json};

/// Helper to build a `NewDomainEvent` with sensible defaults.
fn make_event(aggregate_id: &str, version: i64) -> NewDomainEvent {
    let mut data = Map::new();
    data.insert("action".to_owned(), json!(format!("action-{version}")));
    NewDomainEvent {
        aggregate_id: aggregate_id.to_owned(),
        aggregate_type: "AuditLog".to_owned(),
        event_type: "AuditLogCreated".to_owned(),
        version,
        data,
        metadata: None,
    }
}

fn store_in(dir: &tempfile::TempDir) -> FileEventStore {
    FileEventStore::new(dir.path().join("storage/event-store.ndjson"))
}

// --- append ---

#[tokio::test]
async fn test_append_stamps_id_and_timestamp_and_keeps_version() {
    let dir = tempfile::tempdir().unwrap();
    let fixed_now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
    let store = FileEventStore::with_clock(
        dir.path().join("event-store.ndjson"),
        Arc::new(FixedClock(fixed_now)),
    );

    let appended = store.append(make_event("church-1", 7)).await.unwrap();

    assert_eq!(appended.version, 7);
    assert_eq!(appended.timestamp, fixed_now);
    let result = store
        .query(&EventQuery {
            aggregate_id: Some("church-1".to_owned()),
            ..EventQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(result.events, vec![appended]);
}

#[tokio::test]
async fn test_append_creates_storage_directory_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    assert!(!store.path().exists());

    store.append(make_event("church-1", 1)).await.unwrap();

    assert!(store.path().exists());
}

#[tokio::test]
async fn test_append_generates_unique_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let mut ids = HashSet::new();
    for version in 1..=20 {
        let event = store.append(make_event("church-1", version)).await.unwrap();
        ids.insert(event.id);
    }

    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_each_event_is_one_line_of_json() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.append(make_event("church-1", 1)).await.unwrap();
    store.append(make_event("church-2", 1)).await.unwrap();

    let content = tokio::fs::read_to_string(store.path()).await.unwrap();

    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["aggregateId"], "church-1");
    assert_eq!(first["eventType"], "AuditLogCreated");
    assert_eq!(first["data"]["action"], "action-1");
}

#[tokio::test]
async fn test_events_survive_a_new_store_instance() {
    let dir = tempfile::tempdir().unwrap();
    store_in(&dir).append(make_event("church-1", 1)).await.unwrap();

    let reopened = store_in(&dir);
    let result = reopened.query(&EventQuery::default()).await.unwrap();

    assert_eq!(result.total_count, 1);
}

#[tokio::test]
async fn test_append_io_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    tokio::fs::write(&blocker, "a file, not a directory").await.unwrap();
    let store = FileEventStore::new(blocker.join("event-store.ndjson"));

    let result = store.append(make_event("church-1", 1)).await;

    assert!(matches!(result, Err(EventStoreError::Io(_))));
}

// --- query ---

#[tokio::test]
async fn test_query_filters_and_paginates() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    for version in 1..=6 {
        store.append(make_event("church-1", version)).await.unwrap();
    }
    store.append(make_event("church-2", 1)).await.unwrap();

    let result = store
        .query(
            &EventQuery::for_aggregate("church-1", "AuditLog")
                .with_versions(Some(2), Some(5))
                .paginate(1, 2),
        )
        .await
        .unwrap();

    assert_eq!(result.total_count, 4);
    let versions: Vec<i64> = result.events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 4]);
}

// --- get_by_aggregate_id ---

#[tokio::test]
async fn test_get_by_aggregate_id_sorts_by_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    for version in [3, 1, 2] {
        store.append(make_event("church-1", version)).await.unwrap();
    }
    store.append(make_event("church-2", 0)).await.unwrap();

    let events = store
        .get_by_aggregate_id("church-1", "AuditLog")
        .await
        .unwrap();

    let versions: Vec<i64> = events.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

// --- clear ---

#[tokio::test]
async fn test_clear_truncates_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);
    store.append(make_event("church-1", 1)).await.unwrap();

    store.clear().await.unwrap();
    let result = store.query(&EventQuery::default()).await.unwrap();

    assert_eq!(result.total_count, 0);
    assert!(store.path().exists());
}
