//! Built-in task definitions and the per-scope catalog view.
//!
//! Built-ins are compiled-in constants that can be hidden but never deleted.
//! A [`Catalog`] merges them with the user-defined tasks of one
//! [`TaskList`] so lookups see a single id space.

use std::collections::{BTreeSet, HashMap};

use crate::model::{ResetScope, TaskDefinition, TaskId, TaskKind, TaskList};

/// Kind of a built-in task, in `const`-friendly form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// See [`TaskKind::Toggle`].
    Toggle,
    /// See [`TaskKind::SharedToggle`].
    SharedToggle,
    /// See [`TaskKind::Counter`].
    Counter(u32),
    /// See [`TaskKind::GroupMember`].
    GroupMember(&'static str),
}

/// A compiled-in task definition.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTask {
    /// Stable identifier.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Completion semantics.
    pub kind: BuiltinKind,
    /// Names this task carried in older payloads, used to recognise copies.
    pub legacy_names: &'static [&'static str],
    /// Task-state key this task used before stable ids existed.
    pub legacy_key: Option<&'static str>,
}

impl BuiltinTask {
    /// Converts the constant into an owned definition.
    #[must_use]
    pub fn definition(&self) -> TaskDefinition {
        let kind = match self.kind {
            BuiltinKind::Toggle => TaskKind::Toggle,
            BuiltinKind::SharedToggle => TaskKind::SharedToggle,
            BuiltinKind::Counter(limit) => TaskKind::Counter { limit },
            BuiltinKind::GroupMember(group) => TaskKind::GroupMember {
                group: group.to_string(),
            },
        };
        TaskDefinition {
            id: TaskId::new(self.id),
            name: self.name.to_string(),
            kind,
        }
    }

    /// Whether `name` is the current or a legacy name of this task.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        let name = name.trim();
        self.name == name || self.legacy_names.contains(&name)
    }
}

/// A compiled-in selection group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskGroup {
    /// Identifier referenced by [`TaskKind::GroupMember`].
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Maximum number of members one entity may select per cycle.
    pub cap: usize,
    /// Names of the single checklist entry older payloads used for the
    /// whole group.
    pub legacy_names: &'static [&'static str],
}

/// Weekly field bosses: at most three may be claimed per week.
pub const FIELD_BOSS_GROUP: TaskGroup = TaskGroup {
    id: "field-boss",
    name: "Field bosses",
    cap: 3,
    legacy_names: &["필드보스3종"],
};

/// All compiled-in groups.
pub const BUILTIN_GROUPS: &[TaskGroup] = &[FIELD_BOSS_GROUP];

/// Built-in daily tasks, in default display order.
pub const BUILTIN_DAILY: &[BuiltinTask] = &[
    BuiltinTask {
        id: "daily-free-shop",
        name: "Daily free shop item",
        kind: BuiltinKind::SharedToggle,
        legacy_names: &["매일 무료 상품"],
        legacy_key: Some("dailyfree"),
    },
    BuiltinTask {
        id: "daily-black-hole",
        name: "Black hole (remaining)",
        kind: BuiltinKind::Counter(3),
        legacy_names: &["검은구멍(남은횟수)"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "daily-ominous-barrier",
        name: "Ominous barrier (remaining)",
        kind: BuiltinKind::Counter(2),
        legacy_names: &["불길한 결계(남은횟수)"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "daily-fergus-trade",
        name: "Fergus exchange",
        kind: BuiltinKind::Toggle,
        legacy_names: &["퍼거스 교환"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "daily-nerys-trade",
        name: "Nerys exchange",
        kind: BuiltinKind::Toggle,
        legacy_names: &["네리스 교환"],
        legacy_key: None,
    },
];

/// Built-in weekly tasks, in default display order.
pub const BUILTIN_WEEKLY: &[BuiltinTask] = &[
    BuiltinTask {
        id: "weekly-abyss",
        name: "Abyss dungeons",
        kind: BuiltinKind::Toggle,
        legacy_names: &["어비스 던전3종"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "weekly-glas-raid",
        name: "Glas Ghaibhleann raid",
        kind: BuiltinKind::Toggle,
        legacy_names: &["글라스기브넨 레이드"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "weekly-succubus-raid",
        name: "Succubus raid",
        kind: BuiltinKind::Toggle,
        legacy_names: &["서큐버스 레이드"],
        legacy_key: None,
    },
    BuiltinTask {
        id: "field-boss-red-dragon",
        name: "Red dragon",
        kind: BuiltinKind::GroupMember("field-boss"),
        legacy_names: &[],
        legacy_key: None,
    },
    BuiltinTask {
        id: "field-boss-black-dragon",
        name: "Black dragon",
        kind: BuiltinKind::GroupMember("field-boss"),
        legacy_names: &[],
        legacy_key: None,
    },
    BuiltinTask {
        id: "field-boss-desert-dragon",
        name: "Desert dragon",
        kind: BuiltinKind::GroupMember("field-boss"),
        legacy_names: &[],
        legacy_key: None,
    },
    BuiltinTask {
        id: "field-boss-white-dragon",
        name: "White dragon",
        kind: BuiltinKind::GroupMember("field-boss"),
        legacy_names: &[],
        legacy_key: None,
    },
];

/// Built-in tasks for a scope.
#[must_use]
pub const fn builtins(scope: ResetScope) -> &'static [BuiltinTask] {
    match scope {
        ResetScope::Daily => BUILTIN_DAILY,
        ResetScope::Weekly => BUILTIN_WEEKLY,
    }
}

/// Looks up a built-in group by id.
#[must_use]
pub fn group(id: &str) -> Option<&'static TaskGroup> {
    BUILTIN_GROUPS.iter().find(|g| g.id == id)
}

/// Group whose legacy checklist entry was called `name`, if any of its
/// members live in `scope`.
#[must_use]
pub fn group_for_legacy_name(scope: ResetScope, name: &str) -> Option<&'static TaskGroup> {
    let name = name.trim();
    BUILTIN_GROUPS.iter().find(|g| {
        g.legacy_names.contains(&name)
            && builtins(scope)
                .iter()
                .any(|b| b.kind == BuiltinKind::GroupMember(g.id))
    })
}

/// Whether a pre-stable-id task list could have listed `builtin`, either
/// by one of its own legacy names or through its group's entry.
#[must_use]
pub fn legacy_listable(builtin: &BuiltinTask) -> bool {
    match builtin.kind {
        BuiltinKind::GroupMember(g) => group(g).is_some_and(|g| !g.legacy_names.is_empty()),
        _ => !builtin.legacy_names.is_empty(),
    }
}

/// Whether `id` names a built-in task in any scope.
#[must_use]
pub fn is_builtin(id: &TaskId) -> bool {
    BUILTIN_DAILY
        .iter()
        .chain(BUILTIN_WEEKLY)
        .any(|b| b.id == id.as_str())
}

/// Maps a pre-stable-id task-state key onto the built-in that replaced it.
#[must_use]
pub fn builtin_for_legacy_key(key: &str) -> Option<&'static BuiltinTask> {
    BUILTIN_DAILY
        .iter()
        .chain(BUILTIN_WEEKLY)
        .find(|b| b.legacy_key == Some(key))
}

/// Default task list for a scope: every built-in visible, no custom tasks.
#[must_use]
pub fn default_list(scope: ResetScope) -> TaskList {
    TaskList {
        order: builtins(scope).iter().map(|b| TaskId::new(b.id)).collect(),
        ..TaskList::default()
    }
}

/// Every definition reachable from one scope's task list.
#[derive(Debug, Clone)]
pub struct Catalog {
    definitions: Vec<TaskDefinition>,
    index: HashMap<TaskId, usize>,
}

impl Catalog {
    /// Builds the catalog for `scope` from the built-ins and `list.custom`.
    ///
    /// A custom definition whose id collides with a built-in is shadowed by
    /// the built-in.
    #[must_use]
    pub fn new(scope: ResetScope, list: &TaskList) -> Self {
        let mut definitions: Vec<TaskDefinition> =
            builtins(scope).iter().map(BuiltinTask::definition).collect();
        definitions.extend(list.custom.iter().cloned());

        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            index.entry(def.id.clone()).or_insert(i);
        }

        Self { definitions, index }
    }

    /// Looks up a definition by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.index.get(id).map(|&i| &self.definitions[i])
    }

    /// Iterates every definition, hidden ones included.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDefinition> {
        self.index_order().map(|i| &self.definitions[i])
    }

    /// Definitions shown to the user, in `list.order`.
    ///
    /// Hidden ids and ids that resolve to nothing are skipped.
    #[must_use]
    pub fn visible<'a>(&'a self, list: &TaskList) -> Vec<&'a TaskDefinition> {
        let mut seen = BTreeSet::new();
        list.order
            .iter()
            .filter(|id| !list.removed_ids.contains(*id))
            .filter(|id| seen.insert((*id).clone()))
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Members of the given group present in this catalog.
    pub fn group_members<'a>(&'a self, group_id: &'a str) -> impl Iterator<Item = &'a TaskDefinition> {
        self.iter().filter(move |d| {
            matches!(&d.kind, TaskKind::GroupMember { group } if group == group_id)
        })
    }

    /// Indices of the first definition for each distinct id.
    fn index_order(&self) -> impl Iterator<Item = usize> + '_ {
        self.definitions
            .iter()
            .enumerate()
            .filter(|(i, d)| self.index.get(&d.id) == Some(i))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(id: &str, name: &str) -> TaskDefinition {
        TaskDefinition {
            id: TaskId::new(id),
            name: name.to_string(),
            kind: TaskKind::Toggle,
        }
    }

    #[test]
    fn builtin_ids_are_unique() {
        let mut ids = BTreeSet::new();
        for b in BUILTIN_DAILY.iter().chain(BUILTIN_WEEKLY) {
            assert!(ids.insert(b.id), "duplicate built-in id {}", b.id);
        }
    }

    #[test]
    fn group_members_reference_known_groups() {
        for b in BUILTIN_WEEKLY {
            if let BuiltinKind::GroupMember(g) = b.kind {
                assert!(group(g).is_some(), "unknown group {g}");
            }
        }
    }

    #[test]
    fn default_list_orders_builtins() {
        let list = default_list(ResetScope::Daily);
        assert_eq!(list.order.len(), BUILTIN_DAILY.len());
        assert_eq!(list.order[0].as_str(), "daily-free-shop");
        assert!(list.custom.is_empty());
        assert!(list.removed_ids.is_empty());
    }

    #[test]
    fn visible_skips_hidden_and_dangling() {
        let mut list = default_list(ResetScope::Daily);
        list.custom.push(custom("ud-1", "Buy potion"));
        list.order.push(TaskId::new("ud-1"));
        list.order.push(TaskId::new("ud-gone"));
        list.removed_ids.insert(TaskId::new("daily-fergus-trade"));

        let catalog = Catalog::new(ResetScope::Daily, &list);
        let names: Vec<&str> = catalog
            .visible(&list)
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "daily-free-shop",
                "daily-black-hole",
                "daily-ominous-barrier",
                "daily-nerys-trade",
                "ud-1"
            ]
        );
    }

    #[test]
    fn builtin_shadows_colliding_custom() {
        let mut list = default_list(ResetScope::Daily);
        list.custom.push(custom("daily-fergus-trade", "Impostor"));
        let catalog = Catalog::new(ResetScope::Daily, &list);
        let def = catalog.get(&TaskId::new("daily-fergus-trade")).unwrap();
        assert_eq!(def.name, "Fergus exchange");
        assert_eq!(catalog.iter().count(), BUILTIN_DAILY.len());
    }

    #[test]
    fn field_boss_members_are_weekly() {
        let catalog = Catalog::new(ResetScope::Weekly, &default_list(ResetScope::Weekly));
        assert_eq!(catalog.group_members(FIELD_BOSS_GROUP.id).count(), 4);
        let daily = Catalog::new(ResetScope::Daily, &default_list(ResetScope::Daily));
        assert_eq!(daily.group_members(FIELD_BOSS_GROUP.id).count(), 0);
    }

    #[test]
    fn legacy_lookup() {
        assert_eq!(builtin_for_legacy_key("dailyfree").map(|b| b.id), Some("daily-free-shop"));
        assert!(builtin_for_legacy_key("user-daily-0").is_none());
        assert!(BUILTIN_DAILY[3].answers_to("퍼거스 교환"));
        assert!(BUILTIN_DAILY[3].answers_to(" Fergus exchange "));
    }

    #[test]
    fn field_boss_entry_names_the_group() {
        assert_eq!(
            group_for_legacy_name(ResetScope::Weekly, " 필드보스3종 ").map(|g| g.id),
            Some("field-boss")
        );
        assert!(group_for_legacy_name(ResetScope::Daily, "필드보스3종").is_none());

        // Every built-in an old list could hold is reachable by some name.
        assert!(BUILTIN_DAILY.iter().chain(BUILTIN_WEEKLY).all(legacy_listable));
    }
}
