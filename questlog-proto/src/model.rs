//! Canonical persisted data model.
//!
//! A [`SyncedPayload`] is the unit stored under a sync identifier. It owns
//! the tracked [`Entity`] list, one [`TaskList`] per [`ResetScope`], and the
//! [`ResetCursor`] recording when each scope was last cleared.
//!
//! Every struct carries a flattened `extra` map so fields written by newer
//! clients survive a load/save cycle through an older one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version written into every payload produced by this crate.
pub const SCHEMA_VERSION: u32 = 2;

/// Upper bound for a user-defined counter limit.
pub const MAX_COUNTER_LIMIT: u32 = 20;

/// Stable identifier of a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which reset cycle a task list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    /// Cleared every day at the cutover hour.
    Daily,
    /// Cleared once a week on the weekly reset day.
    Weekly,
}

impl ResetScope {
    /// Both scopes, daily first.
    pub const ALL: [Self; 2] = [Self::Daily, Self::Weekly];

    /// Prefix used for identifiers of user-defined tasks in this scope.
    #[must_use]
    pub const fn custom_prefix(self) -> &'static str {
        match self {
            Self::Daily => "ud",
            Self::Weekly => "uw",
        }
    }
}

impl std::fmt::Display for ResetScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
        }
    }
}

impl std::str::FromStr for ResetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "d" => Ok(Self::Daily),
            "weekly" | "w" => Ok(Self::Weekly),
            other => Err(format!("unknown reset scope: {other}")),
        }
    }
}

/// How a task is completed and how it is cleared on reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskKind {
    /// Per-entity on/off flag.
    Toggle,
    /// Account-wide flag: toggling it flips every entity at once.
    SharedToggle,
    /// Remaining-uses counter, full at `limit`.
    Counter {
        /// Value a reset refills the counter to.
        limit: u32,
    },
    /// Member of a selection group with a shared cap.
    GroupMember {
        /// Identifier of the owning group.
        group: String,
    },
}

impl TaskKind {
    /// Legacy and display name of the kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::SharedToggle => "shared-toggle",
            Self::Counter { .. } => "counter",
            Self::GroupMember { .. } => "group-member",
        }
    }
}

/// Catalog description of a recurring task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Stable identifier, referenced by entity task state.
    pub id: TaskId,
    /// Display name.
    pub name: String,
    /// Completion semantics.
    #[serde(flatten)]
    pub kind: TaskKind,
}

impl TaskDefinition {
    /// Counter limit, if this is a counter task.
    #[must_use]
    pub const fn limit(&self) -> Option<u32> {
        match self.kind {
            TaskKind::Counter { limit } => Some(limit),
            _ => None,
        }
    }
}

/// Stored completion state for one task on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    /// Toggle-like completion flag.
    Done(bool),
    /// Remaining count for counter tasks.
    Count(u32),
}

impl TaskValue {
    /// Whether the value represents a completed flag.
    #[must_use]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done(true))
    }
}

/// Ordered, partially hidden list of tasks for one reset scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskList {
    /// Display order of task ids (built-in and user-defined).
    #[serde(default)]
    pub order: Vec<TaskId>,
    /// Built-in ids the user has hidden.
    #[serde(default)]
    pub removed_ids: BTreeSet<TaskId>,
    /// User-defined definitions belonging to this list.
    #[serde(default)]
    pub custom: Vec<TaskDefinition>,
    /// Unknown fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TaskList {
    /// Returns the user-defined definition with the given id.
    #[must_use]
    pub fn custom_task(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.custom.iter().find(|d| &d.id == id)
    }
}

/// A tracked character with independent task-completion state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Display name.
    pub name: String,
    /// Completion state keyed by task id. A missing key means "not done"
    /// or, for counters, "full".
    #[serde(default)]
    pub task_state: BTreeMap<TaskId, TaskValue>,
    /// Free-form user note.
    #[serde(default)]
    pub note: String,
    /// Unknown fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Entity {
    /// Creates an entity with no recorded progress.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Instants at which each scope was last cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetCursor {
    /// Last daily boundary that has been applied.
    pub last_daily_reset: Option<DateTime<FixedOffset>>,
    /// Last weekly boundary that has been applied.
    pub last_weekly_reset: Option<DateTime<FixedOffset>>,
}

impl ResetCursor {
    /// Returns the stored instant for a scope.
    #[must_use]
    pub const fn get(&self, scope: ResetScope) -> Option<&DateTime<FixedOffset>> {
        match scope {
            ResetScope::Daily => self.last_daily_reset.as_ref(),
            ResetScope::Weekly => self.last_weekly_reset.as_ref(),
        }
    }
}

/// Root persisted unit addressed by a sync identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedPayload {
    /// Always [`SCHEMA_VERSION`] once written by this crate.
    pub schema_version: u32,
    /// Tracked characters, positionally addressed.
    pub entities: Vec<Entity>,
    /// Daily task list.
    pub daily_tasks: TaskList,
    /// Weekly task list.
    pub weekly_tasks: TaskList,
    /// Last applied reset boundaries.
    pub reset_cursor: ResetCursor,
    /// Unknown top-level fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SyncedPayload {
    /// Returns the task list for a scope.
    #[must_use]
    pub const fn tasks(&self, scope: ResetScope) -> &TaskList {
        match scope {
            ResetScope::Daily => &self.daily_tasks,
            ResetScope::Weekly => &self.weekly_tasks,
        }
    }

    /// Returns the task list for a scope, mutably.
    pub const fn tasks_mut(&mut self, scope: ResetScope) -> &mut TaskList {
        match scope {
            ResetScope::Daily => &mut self.daily_tasks,
            ResetScope::Weekly => &mut self.weekly_tasks,
        }
    }
}
