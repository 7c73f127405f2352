//! Property tests for schema migration.
//!
//! 1. `migrate` never panics on arbitrary JSON.
//! 2. Migrating the serialized output again yields the same payload.
//! 3. Legacy positional task state lands on the migrated ids.
//! 4. Unknown top-level fields pass through.

use chrono::DateTime;
use proptest::prelude::*;
use questlog_proto::migrate::{SourceShape, migrate};
use questlog_proto::model::{TaskId, TaskValue};
use questlog_proto::schedule::{Boundaries, compute_boundaries};
use serde_json::{Map, Value, json};

fn boundaries() -> Boundaries {
    compute_boundaries(&DateTime::parse_from_rfc3339("2024-06-12T10:00:00+09:00").unwrap())
}

/// Arbitrary JSON, a few levels deep.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-z0-9-]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::btree_map(
                prop_oneof![
                    Just("characters".to_string()),
                    Just("userDailyTasks".to_string()),
                    Just("tasks".to_string()),
                    Just("name".to_string()),
                    Just("type".to_string()),
                    Just("max".to_string()),
                    Just("lastReset".to_string()),
                    Just("schemaVersion".to_string()),
                    Just("dailyTasks".to_string()),
                    Just("order".to_string()),
                    "[a-z]{1,6}",
                ],
                inner,
                0..8,
            )
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A legacy record with `n` plain-string daily tasks, each done on the
/// first character.
fn arb_legacy() -> impl Strategy<Value = (Value, usize)> {
    prop::collection::vec("[A-Za-z ]{1,16}", 1..8).prop_map(|names| {
        let n = names.len();
        let tasks: Map<String, Value> = (0..n)
            .map(|i| (format!("user-daily-{i}"), Value::Bool(true)))
            .collect();
        let raw = json!({
            "userDailyTasks": names,
            "characters": [{"name": "Mari", "tasks": tasks}],
            "lastReset": {"daily": null, "weekly": null},
        });
        (raw, n)
    })
}

proptest! {
    #[test]
    fn migrate_is_total_and_idempotent(raw in arb_json()) {
        let b = boundaries();
        let first = migrate(raw, &b);
        let encoded = serde_json::to_value(&first.payload).unwrap();
        let second = migrate(encoded, &b);
        prop_assert_eq!(second.source_shape, SourceShape::Current);
        prop_assert_eq!(&second.payload, &first.payload);
    }

    #[test]
    fn migrate_is_deterministic(raw in arb_json()) {
        let b = boundaries();
        prop_assert_eq!(migrate(raw.clone(), &b), migrate(raw, &b));
    }

    #[test]
    fn legacy_state_follows_its_task((raw, n) in arb_legacy()) {
        let report = migrate(raw, &boundaries());
        let entity = &report.payload.entities[0];
        for i in 0..n {
            let key = format!("user-daily-{i}");
            prop_assert!(!entity.task_state.contains_key(&TaskId::new(key)));
        }
        // Every legacy entry is either a custom task or a built-in it copied.
        let done = entity.task_state.values().filter(|v| **v == TaskValue::Done(true)).count();
        prop_assert!(done <= n);
        for def in &report.payload.daily_tasks.custom {
            prop_assert_eq!(entity.task_state.get(&def.id), Some(&TaskValue::Done(true)));
            prop_assert!(report.payload.daily_tasks.order.contains(&def.id));
        }
    }

    #[test]
    fn unknown_top_level_fields_survive(key in "x[a-z]{1,8}", value in any::<i64>()) {
        let mut raw = json!({"characters": []});
        raw[key.as_str()] = json!(value);
        let report = migrate(raw, &boundaries());
        prop_assert_eq!(report.payload.extra.get(&key), Some(&json!(value)));
    }
}
