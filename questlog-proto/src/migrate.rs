//! Schema migration from any persisted shape to [`SyncedPayload`].
//!
//! Three shapes are recognised:
//!
//! - a bare JSON array, read as the entity list;
//! - the legacy object (`characters`, `userDailyTasks`, `userWeeklyTasks`,
//!   `lastReset`) whose tasks have no ids and whose entity state is keyed by
//!   position (`user-daily-0`);
//! - the current object (`schemaVersion`, `entities`, `dailyTasks`, ...).
//!
//! [`migrate`] is total: anything JSON-valid yields a payload, and running it
//! on its own output changes nothing.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, FixedOffset};
use serde_json::{Map, Value};

use crate::catalog::{self, BuiltinKind, BuiltinTask};
use crate::model::{
    Entity, ResetCursor, ResetScope, SCHEMA_VERSION, SyncedPayload, TaskDefinition, TaskId,
    TaskKind, TaskList, TaskValue,
};
use crate::schedule::Boundaries;

/// Which input shape a payload was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceShape {
    /// `null`: nothing stored yet.
    Empty,
    /// A bare array of entities.
    BareArray,
    /// The object written before stable task ids existed.
    Legacy,
    /// An object carrying `schemaVersion`.
    Current,
    /// Any other JSON value; defaults were used.
    Unrecognized,
}

/// Result of [`migrate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Normalised payload.
    pub payload: SyncedPayload,
    /// Shape the input was recognised as.
    pub source_shape: SourceShape,
}

impl MigrationReport {
    /// Whether the stored form differs from what would be written back.
    #[must_use]
    pub fn upgraded(&self) -> bool {
        self.source_shape != SourceShape::Current
    }
}

const LEGACY_KEYS: [&str; 4] = ["characters", "userDailyTasks", "userWeeklyTasks", "lastReset"];

/// Normalises any persisted value into the current schema.
///
/// `boundaries` seeds the reset cursor when the input has none, so a freshly
/// imported record does not immediately reset.
#[must_use]
pub fn migrate(raw: Value, boundaries: &Boundaries) -> MigrationReport {
    let (payload, source_shape) = match raw {
        Value::Null => (empty_payload(boundaries), SourceShape::Empty),
        items @ Value::Array(_) => {
            let mut payload = empty_payload(boundaries);
            payload.entities = parse_entities(items, &BTreeMap::new());
            (payload, SourceShape::BareArray)
        }
        Value::Object(map) => {
            let shape = if map.contains_key("schemaVersion") || map.contains_key("entities") {
                SourceShape::Current
            } else if LEGACY_KEYS.iter().any(|k| map.contains_key(*k)) {
                SourceShape::Legacy
            } else {
                SourceShape::Unrecognized
            };
            (from_object(map, boundaries), shape)
        }
        _ => (empty_payload(boundaries), SourceShape::Unrecognized),
    };
    MigrationReport {
        payload,
        source_shape,
    }
}

/// A payload with no entities, default task lists and a seeded cursor.
#[must_use]
pub fn empty_payload(boundaries: &Boundaries) -> SyncedPayload {
    SyncedPayload {
        schema_version: SCHEMA_VERSION,
        entities: Vec::new(),
        daily_tasks: catalog::default_list(ResetScope::Daily),
        weekly_tasks: catalog::default_list(ResetScope::Weekly),
        reset_cursor: ResetCursor::seeded(boundaries),
        extra: Map::new(),
    }
}

fn from_object(mut map: Map<String, Value>, boundaries: &Boundaries) -> SyncedPayload {
    map.remove("schemaVersion");

    let mut rewrites = BTreeMap::new();
    let daily_tasks = take_field(&mut map, "dailyTasks", "userDailyTasks", is_list)
        .map_or_else(
            || catalog::default_list(ResetScope::Daily),
            |v| parse_task_list(v, ResetScope::Daily, &mut rewrites),
        );
    let weekly_tasks = take_field(&mut map, "weeklyTasks", "userWeeklyTasks", is_list)
        .map_or_else(
            || catalog::default_list(ResetScope::Weekly),
            |v| parse_task_list(v, ResetScope::Weekly, &mut rewrites),
        );
    let entities = take_field(&mut map, "entities", "characters", Value::is_array)
        .map(|v| parse_entities(v, &rewrites))
        .unwrap_or_default();
    let reset_cursor = match take_field(&mut map, "resetCursor", "lastReset", Value::is_object) {
        Some(Value::Object(cursor)) => parse_cursor(&cursor, boundaries),
        _ => ResetCursor::seeded(boundaries),
    };

    SyncedPayload {
        schema_version: SCHEMA_VERSION,
        entities,
        daily_tasks,
        weekly_tasks,
        reset_cursor,
        extra: map,
    }
}

/// Removes `current` if present; otherwise removes `legacy` when `usable`.
///
/// Unusable legacy values stay behind as pass-through fields.
fn take_field(
    map: &mut Map<String, Value>,
    current: &str,
    legacy: &str,
    usable: fn(&Value) -> bool,
) -> Option<Value> {
    if let Some(v) = map.remove(current) {
        return Some(v);
    }
    if map.get(legacy).is_some_and(usable) {
        return map.remove(legacy);
    }
    None
}

fn is_list(v: &Value) -> bool {
    v.is_array() || v.is_object()
}

// Task lists

fn parse_task_list(
    value: Value,
    scope: ResetScope,
    rewrites: &mut BTreeMap<String, TaskId>,
) -> TaskList {
    match value {
        Value::Array(entries) => {
            let parsed = parse_entries(entries, scope, rewrites);
            let removed_ids = if parsed.matched.is_empty() && parsed.groups.is_empty() {
                BTreeSet::new()
            } else {
                // Copied built-ins mark the list as a full copy: built-ins
                // the user had deleted from it become hidden. Built-ins an
                // old list could never have named stay visible.
                catalog::builtins(scope)
                    .iter()
                    .filter(|b| catalog::legacy_listable(b) && !parsed.lists(b))
                    .map(|b| TaskId::new(b.id))
                    .collect()
            };
            let mut list = TaskList {
                removed_ids,
                custom: parsed.custom,
                ..TaskList::default()
            };
            list.order = normalised_order(Vec::new(), scope, &list.custom);
            list
        }
        Value::Object(mut obj) => {
            let order = match obj.remove("order") {
                Some(Value::Array(ids)) => ids.into_iter().filter_map(string_id).collect(),
                _ => Vec::new(),
            };
            let removed_ids = match obj.remove("removedIds") {
                Some(Value::Array(ids)) => ids.into_iter().filter_map(string_id).collect(),
                _ => BTreeSet::new(),
            };
            let custom = match obj.remove("custom") {
                Some(Value::Array(entries)) => parse_entries(entries, scope, rewrites).custom,
                _ => Vec::new(),
            };
            let order = normalised_order(order, scope, &custom);
            TaskList {
                order,
                removed_ids,
                custom,
                extra: obj,
            }
        }
        _ => catalog::default_list(scope),
    }
}

fn string_id(v: Value) -> Option<TaskId> {
    match v {
        Value::String(s) if !s.is_empty() => Some(TaskId::new(s)),
        _ => None,
    }
}

/// Drops duplicate ids, then appends any built-in or custom id not yet
/// listed. Ids that resolve to nothing are kept.
fn normalised_order(order: Vec<TaskId>, scope: ResetScope, custom: &[TaskDefinition]) -> Vec<TaskId> {
    let mut seen = BTreeSet::new();
    let mut out: Vec<TaskId> = order.into_iter().filter(|id| seen.insert(id.clone())).collect();
    let builtin_ids = catalog::builtins(scope).iter().map(|b| TaskId::new(b.id));
    let custom_ids = custom.iter().map(|d| d.id.clone());
    for id in builtin_ids.chain(custom_ids) {
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

#[derive(Default)]
struct ParsedEntries {
    custom: Vec<TaskDefinition>,
    matched: BTreeSet<&'static str>,
    groups: BTreeSet<&'static str>,
}

impl ParsedEntries {
    /// Whether the legacy list named `builtin` itself or its group.
    fn lists(&self, builtin: &BuiltinTask) -> bool {
        self.matched.contains(builtin.id)
            || matches!(builtin.kind, BuiltinKind::GroupMember(g) if self.groups.contains(g))
    }
}

fn parse_entries(
    entries: Vec<Value>,
    scope: ResetScope,
    rewrites: &mut BTreeMap<String, TaskId>,
) -> ParsedEntries {
    let mut out = ParsedEntries::default();
    let mut seen = BTreeSet::new();

    for (i, entry) in entries.into_iter().enumerate() {
        let (name, explicit_id, kind) = match entry {
            Value::String(name) => (name, None, TaskKind::Toggle),
            Value::Object(obj) => {
                let name = obj
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let id = obj
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(TaskId::new);
                (name, id, parse_kind(&obj))
            }
            _ => continue,
        };

        let legacy_key = format!("user-{scope}-{i}");
        let builtin = match &explicit_id {
            Some(id) => find_builtin(scope, |b| b.id == id.as_str()),
            None => find_builtin(scope, |b| b.answers_to(&name)),
        };
        // A whole-group entry has no single task to carry its state, so its
        // positional key is left as is.
        if explicit_id.is_none() {
            if let Some(group) = catalog::group_for_legacy_name(scope, &name) {
                out.groups.insert(group.id);
                continue;
            }
        }
        if let Some(b) = builtin {
            out.matched.insert(b.id);
            if explicit_id.is_none() {
                rewrites.insert(legacy_key, TaskId::new(b.id));
            }
            continue;
        }

        let id = match explicit_id {
            Some(id) => id,
            None => {
                let id = TaskId::new(format!("{}-legacy-{i}", scope.custom_prefix()));
                rewrites.insert(legacy_key, id.clone());
                id
            }
        };
        if seen.insert(id.clone()) && !catalog::is_builtin(&id) {
            out.custom.push(TaskDefinition { id, name, kind });
        }
    }
    out
}

fn find_builtin(scope: ResetScope, pred: impl Fn(&BuiltinTask) -> bool) -> Option<&'static BuiltinTask> {
    catalog::builtins(scope).iter().find(|b| pred(b))
}

fn parse_kind(obj: &Map<String, Value>) -> TaskKind {
    let limit = |key: &str| {
        let n = obj.get(key).and_then(as_count).unwrap_or(1);
        TaskKind::Counter { limit: n.max(1) }
    };
    if let Some(kind) = obj.get("kind").and_then(Value::as_str) {
        return match kind {
            "shared-toggle" => TaskKind::SharedToggle,
            "counter" => limit("limit"),
            "group-member" => TaskKind::GroupMember {
                group: obj
                    .get("group")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => TaskKind::Toggle,
        };
    }
    match obj.get("type").and_then(Value::as_str) {
        Some("servercheck") => TaskKind::SharedToggle,
        Some("select-count") => limit("max"),
        _ => TaskKind::Toggle,
    }
}

/// Reads a non-negative integer, saturating into `u32`. Numeric strings are
/// accepted since older clients stored form input verbatim.
fn as_count(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .or_else(|| n.as_i64().map(|_| 0)),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

// Entities

fn parse_entities(value: Value, rewrites: &BTreeMap<String, TaskId>) -> Vec<Entity> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(Entity::new(name)),
            Value::Object(obj) => Some(parse_entity(obj, rewrites)),
            _ => None,
        })
        .collect()
}

fn parse_entity(mut obj: Map<String, Value>, rewrites: &BTreeMap<String, TaskId>) -> Entity {
    let name = match obj.remove("name") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    // `extra` cannot hold a `note` key, it would shadow the field when written.
    let note = match obj.remove("note") {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => take_string(&mut obj, "memo").unwrap_or_default(),
        Some(other) => other.to_string(),
    };

    let mut task_state = BTreeMap::new();
    if let Some(Value::Object(state)) = obj.remove("taskState") {
        merge_state(&mut task_state, state, rewrites);
    }
    if obj.get("tasks").is_some_and(Value::is_object) {
        if let Some(Value::Object(state)) = obj.remove("tasks") {
            merge_state(&mut task_state, state, rewrites);
        }
    }

    Entity {
        name,
        task_state,
        note,
        extra: obj,
    }
}

/// Removes `key` only when it holds a string.
fn take_string(obj: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !obj.get(key).is_some_and(Value::is_string) {
        return None;
    }
    match obj.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn merge_state(
    into: &mut BTreeMap<TaskId, TaskValue>,
    state: Map<String, Value>,
    rewrites: &BTreeMap<String, TaskId>,
) {
    for (key, value) in state {
        let Some(value) = task_value(&value) else {
            continue;
        };
        let id = rewrites
            .get(&key)
            .cloned()
            .or_else(|| catalog::builtin_for_legacy_key(&key).map(|b| TaskId::new(b.id)))
            .unwrap_or_else(|| TaskId::new(key));
        into.entry(id).or_insert(value);
    }
}

fn task_value(v: &Value) -> Option<TaskValue> {
    match v {
        Value::Bool(b) => Some(TaskValue::Done(*b)),
        Value::Number(_) => as_count(v).map(TaskValue::Count),
        _ => None,
    }
}

// Reset cursor

fn parse_cursor(obj: &Map<String, Value>, boundaries: &Boundaries) -> ResetCursor {
    let offset = *boundaries.daily.offset();
    let field = |current: &str, legacy: &str| {
        obj.get(current)
            .or_else(|| obj.get(legacy))
            .and_then(parse_instant)
            .map(|at| at.with_timezone(&offset))
            .filter(|at| (0..=9999).contains(&at.year()))
    };
    ResetCursor {
        last_daily_reset: field("lastDailyReset", "daily"),
        last_weekly_reset: field("lastWeeklyReset", "weekly"),
    }
}

/// RFC 3339 strings or epoch milliseconds. Anything else reads as "never",
/// as do instants outside the four-digit years RFC 3339 can express.
fn parse_instant(v: &Value) -> Option<DateTime<FixedOffset>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim()).ok(),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|at| at.fixed_offset()),
        _ => None,
    }
}
