//! Reset decision and task-state clearing.
//!
//! [`decide_resets`] compares a [`ResetCursor`] with freshly computed
//! [`Boundaries`]; [`apply_reset`] clears one scope's state on every entity.
//! A due scope advances its cursor to exactly the boundary, so re-running
//! the check before the next boundary never fires again.

use std::collections::BTreeSet;

use crate::catalog::Catalog;
use crate::model::{Entity, ResetCursor, ResetScope, SyncedPayload, TaskKind, TaskValue};
use crate::schedule::Boundaries;

/// Outcome of comparing a cursor with the current boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetDecision {
    /// Daily state must be cleared.
    pub daily_due: bool,
    /// Weekly state must be cleared.
    pub weekly_due: bool,
    /// Cursor to persist once the due resets have been applied.
    pub new_cursor: ResetCursor,
}

impl ResetDecision {
    /// Whether any reset is due.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.daily_due || self.weekly_due
    }

    /// Whether the given scope is due.
    #[must_use]
    pub const fn is_due(&self, scope: ResetScope) -> bool {
        match scope {
            ResetScope::Daily => self.daily_due,
            ResetScope::Weekly => self.weekly_due,
        }
    }
}

impl ResetCursor {
    /// Cursor for a brand-new record: already at the current boundaries, so
    /// creating the record does not itself fire a reset.
    #[must_use]
    pub const fn seeded(boundaries: &Boundaries) -> Self {
        Self {
            last_daily_reset: Some(boundaries.daily),
            last_weekly_reset: Some(boundaries.weekly),
        }
    }
}

/// Decides which scopes must reset.
///
/// A scope is due when its cursor is missing or strictly earlier than its
/// boundary. Due fields advance to the boundary; others are kept, so the
/// cursor never moves backwards.
#[must_use]
pub fn decide_resets(cursor: &ResetCursor, boundaries: &Boundaries) -> ResetDecision {
    let due = |scope: ResetScope| {
        cursor
            .get(scope)
            .is_none_or(|last| *last < boundaries.get(scope))
    };
    let advanced = |scope: ResetScope| {
        if due(scope) {
            Some(boundaries.get(scope))
        } else {
            cursor.get(scope).copied()
        }
    };

    ResetDecision {
        daily_due: due(ResetScope::Daily),
        weekly_due: due(ResetScope::Weekly),
        new_cursor: ResetCursor {
            last_daily_reset: advanced(ResetScope::Daily),
            last_weekly_reset: advanced(ResetScope::Weekly),
        },
    }
}

/// Clears every entity's state for the tasks in `catalog`.
///
/// Toggles lose their entry, counters are refilled to their limit, and each
/// group touched has every member entry removed together. Ids unknown to the
/// catalog are left alone. Returns the number of entries changed.
pub fn apply_reset(entities: &mut [Entity], catalog: &Catalog) -> usize {
    let groups: BTreeSet<&str> = catalog
        .iter()
        .filter_map(|d| match &d.kind {
            TaskKind::GroupMember { group } => Some(group.as_str()),
            _ => None,
        })
        .collect();

    let mut changed = 0;
    for entity in entities.iter_mut() {
        for def in catalog.iter() {
            match def.kind {
                TaskKind::Toggle | TaskKind::SharedToggle => {
                    if entity.task_state.remove(&def.id).is_some() {
                        changed += 1;
                    }
                }
                TaskKind::Counter { limit } => {
                    let full = TaskValue::Count(limit);
                    if entity.task_state.insert(def.id.clone(), full) != Some(full) {
                        changed += 1;
                    }
                }
                TaskKind::GroupMember { .. } => {}
            }
        }
        for group in &groups {
            for member in catalog.group_members(group) {
                if entity.task_state.remove(&member.id).is_some() {
                    changed += 1;
                }
            }
        }
    }

    changed
}

/// Decides and applies any due resets to `payload`, then stores the
/// advanced cursor. The caller persists the result.
pub fn run_due_resets(payload: &mut SyncedPayload, boundaries: &Boundaries) -> ResetDecision {
    let decision = decide_resets(&payload.reset_cursor, boundaries);
    for scope in ResetScope::ALL {
        if decision.is_due(scope) {
            let catalog = Catalog::new(scope, payload.tasks(scope));
            apply_reset(&mut payload.entities, &catalog);
        }
    }
    payload.reset_cursor = decision.new_cursor.clone();
    decision
}
