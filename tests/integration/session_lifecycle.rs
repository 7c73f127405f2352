//! Integration tests for a tracker living through reset cycles.
//!
//! Drives a `Tracker` over the in-memory store with a manual clock:
//! - Daily and weekly resets at their boundaries, and only then
//! - Records with no cursor resetting once and settling
//! - Field boss selections capped and cleared together
//! - Custom schedules and entity caps from settings

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, TimeDelta, Utc, Weekday};
use serde_json::json;

use questlog::app::{SaveStatus, Tracker, TrackerSettings};
use questlog::clock::FixedClock;
use questlog::session::SessionError;
use questlog::sync::memory::MemorySyncStore;
use questlog_proto::ids::SyncId;
use questlog_proto::model::{ResetScope, TaskId, TaskKind, TaskValue};
use questlog_proto::schedule::ResetSchedule;

fn instant(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn kst(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).unwrap()
}

fn id(s: &str) -> TaskId {
    TaskId::new(s)
}

async fn tracker_at(
    store: &MemorySyncStore,
    clock: &Arc<FixedClock>,
    settings: &TrackerSettings,
) -> Tracker<MemorySyncStore> {
    Tracker::open(store.clone(), clock.clone(), settings, None)
        .await
        .unwrap()
}

fn value(tracker: &Tracker<MemorySyncStore>, scope: ResetScope, task: &str) -> TaskValue {
    tracker.session().task_value(0, scope, &id(task)).unwrap()
}

// =============================================================================
// Reset cycles
// =============================================================================

#[tokio::test]
async fn a_week_of_progress() {
    let store = MemorySyncStore::new();
    // Wednesday 2024-06-12, mid-day in UTC+9.
    let clock = Arc::new(FixedClock::new(instant("2024-06-12T12:00:00+09:00")));
    let mut tracker = tracker_at(&store, &clock, &TrackerSettings::default()).await;

    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    tracker
        .apply(|s| s.toggle(0, ResetScope::Daily, &id("daily-fergus-trade")))
        .await
        .unwrap();
    tracker
        .apply(|s| s.set_count(0, ResetScope::Daily, &id("daily-black-hole"), 1))
        .await
        .unwrap();
    tracker
        .apply(|s| s.toggle(0, ResetScope::Weekly, &id("weekly-abyss")))
        .await
        .unwrap();

    // Just before the next cutover nothing changes.
    clock.set(instant("2024-06-13T05:59:59+09:00"));
    assert!(tracker.check_resets().await.unwrap().is_none());
    assert!(value(&tracker, ResetScope::Daily, "daily-fergus-trade").is_done());

    // Thursday 06:00 clears daily state only.
    clock.set(instant("2024-06-13T06:00:00+09:00"));
    assert!(matches!(
        tracker.check_resets().await.unwrap(),
        Some(SaveStatus::Saved)
    ));
    assert!(!value(&tracker, ResetScope::Daily, "daily-fergus-trade").is_done());
    assert_eq!(
        value(&tracker, ResetScope::Daily, "daily-black-hole"),
        TaskValue::Count(3)
    );
    assert!(value(&tracker, ResetScope::Weekly, "weekly-abyss").is_done());

    // Sunday night still belongs to the same week.
    clock.set(instant("2024-06-17T05:59:00+09:00"));
    tracker.check_resets().await.unwrap();
    assert!(value(&tracker, ResetScope::Weekly, "weekly-abyss").is_done());

    // Monday 06:00 clears the weekly list too.
    clock.set(instant("2024-06-17T06:00:00+09:00"));
    tracker.check_resets().await.unwrap();
    assert!(!value(&tracker, ResetScope::Weekly, "weekly-abyss").is_done());

    let cursor = &tracker.session().payload().reset_cursor;
    assert_eq!(cursor.last_daily_reset, Some(kst("2024-06-17T06:00:00+09:00")));
    assert_eq!(cursor.last_weekly_reset, Some(kst("2024-06-17T06:00:00+09:00")));

    let stored = store.record(tracker.sync_id().unwrap()).unwrap();
    assert_eq!(
        stored["resetCursor"]["lastWeeklyReset"],
        json!("2024-06-17T06:00:00+09:00")
    );
}

#[tokio::test]
async fn record_without_cursor_resets_once() {
    let store = MemorySyncStore::new();
    let sync_id = SyncId::parse("NoCursor").unwrap();
    store.insert(
        sync_id.clone(),
        json!({
            "schemaVersion": 2,
            "entities": [{"name": "Mari", "taskState": {"daily-fergus-trade": true, "daily-black-hole": 0}}],
            "resetCursor": {"lastDailyReset": null, "lastWeeklyReset": null}
        }),
    );

    let clock = Arc::new(FixedClock::new(instant("2024-06-10T05:59:00+09:00")));
    let settings = TrackerSettings {
        sync_id: Some(sync_id.clone()),
        ..TrackerSettings::default()
    };
    let tracker = tracker_at(&store, &clock, &settings).await;

    let cursor = &tracker.session().payload().reset_cursor;
    assert_eq!(cursor.last_daily_reset, Some(kst("2024-06-09T06:00:00+09:00")));
    assert!(!value(&tracker, ResetScope::Daily, "daily-fergus-trade").is_done());
    assert_eq!(
        value(&tracker, ResetScope::Daily, "daily-black-hole"),
        TaskValue::Count(3)
    );

    // Reopening before the next boundary leaves the stored record alone.
    let before = store.record(&sync_id).unwrap();
    let mut again = tracker_at(&store, &clock, &settings).await;
    assert_eq!(store.record(&sync_id).unwrap(), before);
    assert!(again.check_resets().await.unwrap().is_none());

    // The boundary instant itself is due.
    clock.set(instant("2024-06-10T06:00:00+09:00"));
    assert!(again.check_resets().await.unwrap().is_some());
    assert_eq!(
        again.session().payload().reset_cursor.last_daily_reset,
        Some(kst("2024-06-10T06:00:00+09:00"))
    );
}

// =============================================================================
// Selection groups
// =============================================================================

#[tokio::test]
async fn field_boss_selections_capped_and_cleared_together() {
    let store = MemorySyncStore::new();
    let clock = Arc::new(FixedClock::new(instant("2024-06-12T12:00:00+09:00")));
    let mut tracker = tracker_at(&store, &clock, &TrackerSettings::default()).await;
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();

    for boss in [
        "field-boss-red-dragon",
        "field-boss-black-dragon",
        "field-boss-desert-dragon",
    ] {
        tracker
            .apply(|s| s.toggle(0, ResetScope::Weekly, &id(boss)))
            .await
            .unwrap();
    }
    let err = tracker
        .apply(|s| s.toggle(0, ResetScope::Weekly, &id("field-boss-white-dragon")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        questlog::app::TrackerError::Session(SessionError::GroupCapReached { cap: 3, .. })
    ));

    clock.set(instant("2024-06-17T06:00:00+09:00"));
    tracker.check_resets().await.unwrap();
    let state = &tracker.session().entities()[0].task_state;
    assert!(!state.keys().any(|k| k.as_str().starts_with("field-boss-")));
}

// =============================================================================
// Settings
// =============================================================================

#[tokio::test]
async fn custom_schedule_moves_boundaries() {
    let store = MemorySyncStore::new();
    // Thursday 03:59 in UTC-5 is still Wednesday's cycle with a 04:00 cutover.
    let clock = Arc::new(FixedClock::new(instant("2024-06-13T03:59:00-05:00")));
    let settings = TrackerSettings {
        schedule: ResetSchedule::new(-5, 4, Weekday::Thu).unwrap(),
        ..TrackerSettings::default()
    };
    let mut tracker = tracker_at(&store, &clock, &settings).await;
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    tracker
        .apply(|s| s.toggle(0, ResetScope::Weekly, &id("weekly-glas-raid")))
        .await
        .unwrap();

    clock.advance(TimeDelta::minutes(1));
    tracker.check_resets().await.unwrap();
    assert!(!value(&tracker, ResetScope::Weekly, "weekly-glas-raid").is_done());
    assert_eq!(
        tracker.session().payload().reset_cursor.last_weekly_reset,
        Some(DateTime::parse_from_rfc3339("2024-06-13T04:00:00-05:00").unwrap())
    );
}

#[tokio::test]
async fn entity_cap_comes_from_settings() {
    let store = MemorySyncStore::new();
    let clock = Arc::new(FixedClock::new(instant("2024-06-12T12:00:00+09:00")));
    let settings = TrackerSettings {
        max_entities: 2,
        ..TrackerSettings::default()
    };
    let mut tracker = tracker_at(&store, &clock, &settings).await;
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    tracker.apply(|s| s.add_entity("Nao")).await.unwrap();

    let before = store.record(tracker.sync_id().unwrap()).unwrap();
    let err = tracker.apply(|s| s.add_entity("Ruairi")).await.unwrap_err();
    assert!(matches!(
        err,
        questlog::app::TrackerError::Session(SessionError::EntityCapReached(2))
    ));
    assert_eq!(store.record(tracker.sync_id().unwrap()).unwrap(), before);
}

#[tokio::test]
async fn custom_tasks_survive_reload_and_reset_to_limit() {
    let store = MemorySyncStore::new();
    let clock = Arc::new(FixedClock::new(instant("2024-06-12T12:00:00+09:00")));
    let mut tracker = tracker_at(&store, &clock, &TrackerSettings::default()).await;
    tracker.apply(|s| s.add_entity("Mari")).await.unwrap();
    let (tower, _) = tracker
        .apply(|s| s.add_custom_task(ResetScope::Daily, "Tower", TaskKind::Counter { limit: 5 }))
        .await
        .unwrap();
    tracker
        .apply(|s| s.set_count(0, ResetScope::Daily, &tower, 2))
        .await
        .unwrap();
    tracker
        .apply(|s| s.move_task(ResetScope::Daily, &tower, 0))
        .await
        .unwrap();

    clock.set(instant("2024-06-13T06:00:00+09:00"));
    let settings = TrackerSettings {
        sync_id: tracker.sync_id().cloned(),
        ..TrackerSettings::default()
    };
    let reloaded = tracker_at(&store, &clock, &settings).await;
    let visible = reloaded.session().visible_tasks(ResetScope::Daily);
    assert_eq!(visible[0].id, tower);
    assert_eq!(
        reloaded
            .session()
            .task_value(0, ResetScope::Daily, &tower)
            .unwrap(),
        TaskValue::Count(5)
    );
}
