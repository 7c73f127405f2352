//! In-memory tracker state and the user-facing mutations on it.
//!
//! A [`Session`] owns one [`SyncedPayload`]. Every mutation validates first
//! and changes nothing on error, so a rejected command leaves the state as
//! it was. Persisting the result is the caller's job (see
//! [`crate::app::Tracker`]).

use chrono::{DateTime, Utc};
use questlog_proto::catalog::{self, Catalog};
use questlog_proto::migrate::{self, SourceShape};
use questlog_proto::model::{
    Entity, MAX_COUNTER_LIMIT, ResetScope, SyncedPayload, TaskDefinition, TaskId, TaskKind,
    TaskValue,
};
use questlog_proto::reset::{self, ResetDecision};
use questlog_proto::schedule::ResetSchedule;
use serde_json::Value;
use uuid::Uuid;

/// Default number of entities one record may hold.
pub const DEFAULT_MAX_ENTITIES: usize = 6;

/// Validation failures. None of them mutate the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("entity limit of {0} reached")]
    EntityCapReached(usize),

    #[error("no entity at position {0}")]
    UnknownEntity(usize),

    #[error("no entity named {0}")]
    EntityNotFound(String),

    #[error("no visible {scope} task with id {id}")]
    UnknownTask { scope: ResetScope, id: TaskId },

    #[error("task {0} is a counter, set its count instead")]
    NotToggle(TaskId),

    #[error("task {0} is not a counter")]
    NotCounter(TaskId),

    #[error("count {value} is outside 0..={limit}")]
    CountOutOfRange { value: u32, limit: u32 },

    #[error("counter limit {0} is outside 1..=20")]
    LimitOutOfRange(u32),

    #[error("task name must not be empty")]
    EmptyTaskName,

    #[error("{group}: at most {cap} may be selected")]
    GroupCapReached { group: String, cap: usize },

    #[error("custom tasks cannot be of kind {0}")]
    UnsupportedKind(&'static str),

    #[error("position {position} is outside 0..{len}")]
    PositionOutOfRange { position: usize, len: usize },
}

/// What happened while loading a stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Shape the stored value was recognised as.
    pub source_shape: SourceShape,
    /// Resets applied during the load.
    pub reset: ResetDecision,
}

impl LoadOutcome {
    /// Whether the loaded state differs from what is stored remotely.
    #[must_use]
    pub fn needs_save(&self) -> bool {
        self.source_shape != SourceShape::Current || self.reset.any()
    }
}

/// Tracker state for one sync record.
#[derive(Debug, Clone)]
pub struct Session {
    payload: SyncedPayload,
    schedule: ResetSchedule,
    max_entities: usize,
}

impl Session {
    /// A brand-new session with no entities and a cursor seeded at the
    /// current boundaries.
    #[must_use]
    pub fn new(schedule: ResetSchedule, max_entities: usize, now: &DateTime<Utc>) -> Self {
        let boundaries = schedule.boundaries(now);
        Self {
            payload: migrate::empty_payload(&boundaries),
            schedule,
            max_entities,
        }
    }

    /// Builds a session from a stored value of any known shape, then applies
    /// the resets that came due while it was stored.
    #[must_use]
    pub fn load(
        raw: Value,
        schedule: ResetSchedule,
        max_entities: usize,
        now: &DateTime<Utc>,
    ) -> (Self, LoadOutcome) {
        let boundaries = schedule.boundaries(now);
        let report = migrate::migrate(raw, &boundaries);
        if report.upgraded() {
            tracing::info!(shape = ?report.source_shape, "migrated stored record");
        }

        let mut payload = report.payload;
        let reset = reset::run_due_resets(&mut payload, &boundaries);
        if reset.any() {
            tracing::info!(
                daily = reset.daily_due,
                weekly = reset.weekly_due,
                "applied due resets"
            );
        }

        let session = Self {
            payload,
            schedule,
            max_entities,
        };
        let outcome = LoadOutcome {
            source_shape: report.source_shape,
            reset,
        };
        (session, outcome)
    }

    /// Applies any resets due at `now`.
    pub fn check_resets(&mut self, now: &DateTime<Utc>) -> ResetDecision {
        let boundaries = self.schedule.boundaries(now);
        let decision = reset::run_due_resets(&mut self.payload, &boundaries);
        if decision.any() {
            tracing::debug!(
                daily = decision.daily_due,
                weekly = decision.weekly_due,
                "reset boundary crossed"
            );
        }
        decision
    }

    #[must_use]
    pub const fn payload(&self) -> &SyncedPayload {
        &self.payload
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.payload.entities
    }

    /// Whether the session tracks no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.entities.is_empty()
    }

    #[must_use]
    pub const fn max_entities(&self) -> usize {
        self.max_entities
    }

    #[must_use]
    pub const fn schedule(&self) -> &ResetSchedule {
        &self.schedule
    }

    /// Serialises the payload for upload.
    ///
    /// # Errors
    ///
    /// Returns the encoder error; the payload types never produce one in
    /// practice.
    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.payload)
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Adds an entity with every counter full. Returns its position.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyName`] for a blank name,
    /// [`SessionError::EntityCapReached`] when the session is full.
    pub fn add_entity(&mut self, name: &str) -> Result<usize, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        if self.payload.entities.len() >= self.max_entities {
            return Err(SessionError::EntityCapReached(self.max_entities));
        }

        let mut entity = Entity::new(name);
        for scope in ResetScope::ALL {
            let catalog = Catalog::new(scope, self.payload.tasks(scope));
            for def in catalog.iter() {
                if let Some(limit) = def.limit() {
                    entity.task_state.insert(def.id.clone(), TaskValue::Count(limit));
                }
            }
        }
        self.payload.entities.push(entity);
        Ok(self.payload.entities.len() - 1)
    }

    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`] or [`SessionError::EmptyName`].
    pub fn rename_entity(&mut self, index: usize, name: &str) -> Result<(), SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        self.entity_mut(index)?.name = name.to_string();
        Ok(())
    }

    /// Removes and returns the entity at `index`.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`] if there is none.
    pub fn remove_entity(&mut self, index: usize) -> Result<Entity, SessionError> {
        if index >= self.payload.entities.len() {
            return Err(SessionError::UnknownEntity(index));
        }
        Ok(self.payload.entities.remove(index))
    }

    /// Replaces an entity's note.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`] if there is none.
    pub fn set_note(&mut self, index: usize, note: &str) -> Result<(), SessionError> {
        self.entity_mut(index)?.note = note.to_string();
        Ok(())
    }

    /// Resolves a 1-based position or an exact name to an entity index.
    ///
    /// # Errors
    ///
    /// [`SessionError::EntityNotFound`] if nothing matches.
    pub fn find_entity(&self, key: &str) -> Result<usize, SessionError> {
        let key = key.trim();
        let found = match key.parse::<usize>() {
            Ok(n) => n.checked_sub(1).filter(|&i| i < self.payload.entities.len()),
            Err(_) => self.payload.entities.iter().position(|e| e.name == key),
        };
        found.ok_or_else(|| SessionError::EntityNotFound(key.to_string()))
    }

    fn entity(&self, index: usize) -> Result<&Entity, SessionError> {
        self.payload
            .entities
            .get(index)
            .ok_or(SessionError::UnknownEntity(index))
    }

    fn entity_mut(&mut self, index: usize) -> Result<&mut Entity, SessionError> {
        self.payload
            .entities
            .get_mut(index)
            .ok_or(SessionError::UnknownEntity(index))
    }

    // -----------------------------------------------------------------------
    // Progress
    // -----------------------------------------------------------------------

    /// Tasks shown for `scope`, in display order.
    #[must_use]
    pub fn visible_tasks(&self, scope: ResetScope) -> Vec<TaskDefinition> {
        let list = self.payload.tasks(scope);
        Catalog::new(scope, list)
            .visible(list)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Resolves a task id or a visible task's name (ignoring ASCII case).
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownTask`] if no visible task matches.
    pub fn find_task(&self, scope: ResetScope, key: &str) -> Result<TaskId, SessionError> {
        let key = key.trim();
        self.visible_tasks(scope)
            .into_iter()
            .find(|d| d.id.as_str() == key || d.name.eq_ignore_ascii_case(key))
            .map(|d| d.id)
            .ok_or_else(|| SessionError::UnknownTask {
                scope,
                id: TaskId::new(key),
            })
    }

    fn visible_task(&self, scope: ResetScope, id: &TaskId) -> Result<TaskDefinition, SessionError> {
        let list = self.payload.tasks(scope);
        Catalog::new(scope, list)
            .visible(list)
            .into_iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownTask {
                scope,
                id: id.clone(),
            })
    }

    /// Current value of a task on one entity. A missing counter reads as
    /// full and a missing flag as not done.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`] or [`SessionError::UnknownTask`].
    pub fn task_value(
        &self,
        index: usize,
        scope: ResetScope,
        id: &TaskId,
    ) -> Result<TaskValue, SessionError> {
        let def = self.visible_task(scope, id)?;
        let entity = self.entity(index)?;
        Ok(entity.task_state.get(id).copied().unwrap_or_else(|| {
            def.limit()
                .map_or(TaskValue::Done(false), TaskValue::Count)
        }))
    }

    /// Flips a checkbox task and returns its new state.
    ///
    /// A shared toggle is flipped on every entity, following the first
    /// entity's current value. Selecting a group member fails once the
    /// entity already holds the group's cap.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`], [`SessionError::UnknownTask`],
    /// [`SessionError::NotToggle`] for counters, or
    /// [`SessionError::GroupCapReached`].
    pub fn toggle(&mut self, index: usize, scope: ResetScope, id: &TaskId) -> Result<bool, SessionError> {
        let def = self.visible_task(scope, id)?;
        let entity = self.entity(index)?;

        match &def.kind {
            TaskKind::Toggle => {
                let done = !is_done(entity, id);
                set_flag(self.entity_mut(index)?, id, done);
                Ok(done)
            }
            TaskKind::SharedToggle => {
                let done = self
                    .payload
                    .entities
                    .first()
                    .is_none_or(|first| !is_done(first, id));
                for entity in &mut self.payload.entities {
                    set_flag(entity, id, done);
                }
                Ok(done)
            }
            TaskKind::GroupMember { group } => {
                if is_done(entity, id) {
                    set_flag(self.entity_mut(index)?, id, false);
                    return Ok(false);
                }
                if let Some(g) = catalog::group(group) {
                    let catalog = Catalog::new(scope, self.payload.tasks(scope));
                    let selected = catalog
                        .group_members(group)
                        .filter(|m| is_done(entity, &m.id))
                        .count();
                    if selected >= g.cap {
                        return Err(SessionError::GroupCapReached {
                            group: g.name.to_string(),
                            cap: g.cap,
                        });
                    }
                }
                set_flag(self.entity_mut(index)?, id, true);
                Ok(true)
            }
            TaskKind::Counter { .. } => Err(SessionError::NotToggle(id.clone())),
        }
    }

    /// Sets a counter's remaining value.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownEntity`], [`SessionError::UnknownTask`],
    /// [`SessionError::NotCounter`], or [`SessionError::CountOutOfRange`].
    pub fn set_count(
        &mut self,
        index: usize,
        scope: ResetScope,
        id: &TaskId,
        value: u32,
    ) -> Result<(), SessionError> {
        let def = self.visible_task(scope, id)?;
        let limit = def
            .limit()
            .ok_or_else(|| SessionError::NotCounter(id.clone()))?;
        if value > limit {
            return Err(SessionError::CountOutOfRange { value, limit });
        }
        self.entity_mut(index)?
            .task_state
            .insert(id.clone(), TaskValue::Count(value));
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Task lists
    // -----------------------------------------------------------------------

    /// Appends a user-defined task to `scope` and returns its new id.
    ///
    /// # Errors
    ///
    /// [`SessionError::EmptyTaskName`], [`SessionError::UnsupportedKind`]
    /// for group members, or [`SessionError::LimitOutOfRange`].
    pub fn add_custom_task(
        &mut self,
        scope: ResetScope,
        name: &str,
        kind: TaskKind,
    ) -> Result<TaskId, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyTaskName);
        }
        match kind {
            TaskKind::GroupMember { .. } => return Err(SessionError::UnsupportedKind(kind.label())),
            TaskKind::Counter { limit } if !(1..=MAX_COUNTER_LIMIT).contains(&limit) => {
                return Err(SessionError::LimitOutOfRange(limit));
            }
            _ => {}
        }

        let id = TaskId::new(format!(
            "{}-{}",
            scope.custom_prefix(),
            Uuid::now_v7().simple()
        ));
        let list = self.payload.tasks_mut(scope);
        list.custom.push(TaskDefinition {
            id: id.clone(),
            name: name.to_string(),
            kind,
        });
        list.order.push(id.clone());
        Ok(id)
    }

    /// Hides a built-in task, or deletes a user-defined one together with
    /// every entity's progress on it.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownTask`] if `id` is neither.
    pub fn remove_task(&mut self, scope: ResetScope, id: &TaskId) -> Result<(), SessionError> {
        let list = self.payload.tasks_mut(scope);
        if catalog::builtins(scope).iter().any(|b| b.id == id.as_str()) {
            list.removed_ids.insert(id.clone());
            return Ok(());
        }

        let Some(pos) = list.custom.iter().position(|d| &d.id == id) else {
            return Err(SessionError::UnknownTask {
                scope,
                id: id.clone(),
            });
        };
        list.custom.remove(pos);
        list.order.retain(|o| o != id);

        for entity in &mut self.payload.entities {
            entity.task_state.remove(id);
        }
        Ok(())
    }

    /// Moves a visible task to position `to` among the visible tasks.
    /// Hidden and dangling ids keep their relative order after them.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownTask`] or [`SessionError::PositionOutOfRange`].
    pub fn move_task(&mut self, scope: ResetScope, id: &TaskId, to: usize) -> Result<(), SessionError> {
        let mut visible: Vec<TaskId> = self
            .visible_tasks(scope)
            .into_iter()
            .map(|d| d.id)
            .collect();
        let from = visible
            .iter()
            .position(|v| v == id)
            .ok_or_else(|| SessionError::UnknownTask {
                scope,
                id: id.clone(),
            })?;
        if to >= visible.len() {
            return Err(SessionError::PositionOutOfRange {
                position: to,
                len: visible.len(),
            });
        }

        let moved = visible.remove(from);
        visible.insert(to, moved);

        let list = self.payload.tasks_mut(scope);
        let rest: Vec<TaskId> = list
            .order
            .iter()
            .filter(|o| !visible.contains(o))
            .cloned()
            .collect();
        list.order = visible.into_iter().chain(rest).collect();
        Ok(())
    }

    /// Puts both task lists back to the built-in defaults. Entities and
    /// their built-in progress are kept; progress on dropped custom tasks
    /// is discarded. Returns how many custom tasks were dropped.
    pub fn restore_default_lists(&mut self) -> usize {
        let mut dropped = Vec::new();
        for scope in ResetScope::ALL {
            let list = self.payload.tasks_mut(scope);
            dropped.extend(list.custom.iter().map(|d| d.id.clone()));
            let extra = std::mem::take(&mut list.extra);
            *list = catalog::default_list(scope);
            list.extra = extra;
        }

        for entity in &mut self.payload.entities {
            for id in &dropped {
                entity.task_state.remove(id);
            }
        }
        dropped.len()
    }
}

fn is_done(entity: &Entity, id: &TaskId) -> bool {
    entity.task_state.get(id).is_some_and(|v| v.is_done())
}

/// Unchecked flags are stored as an absent key.
fn set_flag(entity: &mut Entity, id: &TaskId, done: bool) {
    if done {
        entity.task_state.insert(id.clone(), TaskValue::Done(true));
    } else {
        entity.task_state.remove(id);
    }
}
