//! Integration tests for the HTTP sync path.
//!
//! Runs the sync server in-process on an ephemeral port and drives it with
//! the client's `HttpSyncStore` and `Tracker`:
//! - Record fetch/save/delete and short-code lookup over HTTP
//! - Two devices sharing one record through a short code
//! - Legacy records written by old clients migrated on first open
//! - An unreachable server surfacing as pending saves, not lost state

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use questlog::app::{SaveStatus, Tracker, TrackerError, TrackerSettings};
use questlog::clock::FixedClock;
use questlog::sync::http::HttpSyncStore;
use questlog::sync::{SyncError, SyncStore};
use questlog_proto::ids::SyncId;
use questlog_proto::model::{ResetScope, TaskId, TaskValue};

/// Start the sync server in-process and return its base URL.
async fn start_sync() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = questlog_sync::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start sync server");
    (format!("http://{addr}"), handle)
}

fn clock_at(s: &str) -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc),
    ))
}

/// URL of a port that was just released, so connections are refused.
fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn settings_for(id: &SyncId) -> TrackerSettings {
    TrackerSettings {
        sync_id: Some(id.clone()),
        ..TrackerSettings::default()
    }
}

// =============================================================================
// Store operations
// =============================================================================

#[tokio::test]
async fn store_round_trip() {
    let (url, _handle) = start_sync().await;
    let store = HttpSyncStore::new(&url).unwrap();
    let id = SyncId::parse("Round001").unwrap();

    assert!(store.fetch(&id).await.unwrap().is_none());

    let doc = json!({"schemaVersion": 2, "entities": [], "custom": {"a": [1, 2]}});
    store.save(&id, &doc).await.unwrap();
    assert_eq!(store.fetch(&id).await.unwrap(), Some(doc));

    assert_eq!(store.resolve_short_code("Round001").await.unwrap(), Some(id.clone()));
    assert_eq!(store.resolve_short_code("Missing1").await.unwrap(), None);

    assert!(store.delete(&id).await.unwrap());
    assert!(!store.delete(&id).await.unwrap());
    assert!(store.fetch(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn last_write_wins() {
    let (url, _handle) = start_sync().await;
    let store = HttpSyncStore::new(&url).unwrap();
    let id = SyncId::parse("Lww00001").unwrap();

    store.save(&id, &json!({"v": 1})).await.unwrap();
    store.save(&id, &json!({"v": 2})).await.unwrap();
    assert_eq!(store.fetch(&id).await.unwrap(), Some(json!({"v": 2})));
}

#[tokio::test]
async fn invalid_short_code_is_a_status_error() {
    let (url, _handle) = start_sync().await;
    let store = HttpSyncStore::new(&url).unwrap();

    let err = store.resolve_short_code("no!").await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 400, .. }));
}

#[tokio::test]
async fn wrong_endpoint_is_not_mistaken_for_missing_record() {
    let (url, _handle) = start_sync().await;
    let store = HttpSyncStore::new(&format!("{url}/elsewhere/")).unwrap();
    let id = SyncId::parse("AbCd1234").unwrap();

    let err = store.fetch(&id).await.unwrap_err();
    assert!(matches!(err, SyncError::Status { status: 404, .. }));
}

// =============================================================================
// Tracker over HTTP
// =============================================================================

#[tokio::test]
async fn two_devices_share_a_record() {
    let (url, _handle) = start_sync().await;
    let clock = clock_at("2024-06-10T12:00:00+09:00");

    let mut phone = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &TrackerSettings::default(),
        None,
    )
    .await
    .unwrap();
    let (_, status) = phone.apply(|s| s.add_entity("Mari")).await.unwrap();
    assert!(matches!(status, SaveStatus::Saved));
    let code = phone.short_code().unwrap().to_string();

    let mut laptop = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &TrackerSettings::default(),
        None,
    )
    .await
    .unwrap();
    let id = laptop.link(&code).await.unwrap();
    assert_eq!(id.as_str(), code);

    let fergus = TaskId::new("daily-fergus-trade");
    laptop
        .apply(|s| s.toggle(0, ResetScope::Daily, &fergus))
        .await
        .unwrap();

    let phone_again = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &settings_for(&id),
        None,
    )
    .await
    .unwrap();
    assert!(
        phone_again
            .session()
            .task_value(0, ResetScope::Daily, &fergus)
            .unwrap()
            .is_done()
    );
}

#[tokio::test]
async fn legacy_record_is_migrated_on_open() {
    let (url, _handle) = start_sync().await;
    let store = HttpSyncStore::new(&url).unwrap();
    let id = SyncId::parse("OldPhone").unwrap();
    store
        .save(
            &id,
            &json!({
                "characters": [
                    {"name": "Mari", "tasks": {"user-daily-0": true, "dailyfree": true}, "memo": "main"}
                ],
                "userDailyTasks": ["Buy potion"],
                "lastReset": {"daily": "2024-06-10T06:00:00+09:00", "weekly": "2024-06-10T06:00:00+09:00"}
            }),
        )
        .await
        .unwrap();

    let clock = clock_at("2024-06-10T12:00:00+09:00");
    let tracker = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock,
        &settings_for(&id),
        None,
    )
    .await
    .unwrap();

    let entity = &tracker.session().entities()[0];
    assert_eq!(entity.note, "main");
    assert_eq!(
        entity.task_state.get(&TaskId::new("ud-legacy-0")),
        Some(&TaskValue::Done(true))
    );

    let stored = store.fetch(&id).await.unwrap().unwrap();
    assert_eq!(stored["schemaVersion"], json!(2));
    assert_eq!(stored["entities"][0]["taskState"]["daily-free-shop"], json!(true));
    assert!(stored.get("characters").is_none());
}

#[tokio::test]
async fn daily_reset_is_written_back() {
    let (url, _handle) = start_sync().await;
    let clock = clock_at("2024-06-10T12:00:00+09:00");
    let mut tracker = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &TrackerSettings::default(),
        None,
    )
    .await
    .unwrap();
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    let hole = TaskId::new("daily-black-hole");
    tracker
        .apply(|s| s.set_count(0, ResetScope::Daily, &hole, 0))
        .await
        .unwrap();
    let id = tracker.sync_id().unwrap().clone();

    clock.advance(TimeDelta::hours(18));
    let _reopened = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &settings_for(&id),
        None,
    )
    .await
    .unwrap();

    let stored = HttpSyncStore::new(&url)
        .unwrap()
        .fetch(&id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored["entities"][0]["taskState"]["daily-black-hole"], json!(3));
    assert_eq!(
        stored["resetCursor"]["lastDailyReset"],
        json!("2024-06-11T06:00:00+09:00")
    );
}

#[tokio::test]
async fn removing_last_entity_deletes_server_record() {
    let (url, _handle) = start_sync().await;
    let clock = clock_at("2024-06-10T12:00:00+09:00");
    let mut tracker = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock,
        &TrackerSettings::default(),
        None,
    )
    .await
    .unwrap();
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    let id = tracker.sync_id().unwrap().clone();

    let (_, status) = tracker.apply(|s| s.remove_entity(0)).await.unwrap();
    assert!(matches!(status, SaveStatus::Deleted));
    assert!(tracker.sync_id().is_none());

    let store = HttpSyncStore::new(&url).unwrap();
    assert!(store.fetch(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn outage_keeps_local_state() {
    let url = dead_url();
    let clock = clock_at("2024-06-10T12:00:00+09:00");
    let mut tracker = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock.clone(),
        &TrackerSettings::default(),
        None,
    )
    .await
    .unwrap();

    let (index, status) = tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    assert_eq!(index, 0);
    assert!(matches!(status, SaveStatus::Pending(SyncError::Transport(_))));
    assert_eq!(tracker.session().entities().len(), 1);
    assert!(tracker.has_pending());
    let id = tracker.sync_id().unwrap().clone();

    let reopen = Tracker::open(
        HttpSyncStore::new(&url).unwrap(),
        clock,
        &settings_for(&id),
        None,
    )
    .await;
    assert!(matches!(reopen, Err(TrackerError::Sync(SyncError::Transport(_)))));
}
