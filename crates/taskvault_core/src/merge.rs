//! Local/remote task merge.
//!
//! # Responsibility
//! - Combine the cached list and a server listing into one de-duplicated view.
//!
//! # Invariants
//! - Local entries are visited before remote entries; first seen wins.
//! - Temporary-id tasks are keyed by normalized title, confirmed tasks by id.
//! - A remote entry whose normalized title matches an unconfirmed local task
//!   is dropped until the orchestrator reconciles the two.
//! - Output preserves first-seen order.

use crate::model::task::{ServerId, Task, TaskId};
use std::collections::HashSet;

/// Identity under which a task occupies a slot in the merged view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MergeKey {
    Title(String),
    Id(ServerId),
}

impl MergeKey {
    pub fn for_task(task: &Task) -> Self {
        match &task.id {
            TaskId::Local(_) => Self::Title(task.normalized_title()),
            TaskId::Server(id) => Self::Id(*id),
        }
    }
}

/// Merges `local` and `remote` into the canonical view.
pub fn merge(local: &[Task], remote: &[Task]) -> Vec<Task> {
    let mut seen: HashSet<MergeKey> = HashSet::with_capacity(local.len() + remote.len());
    let mut merged = Vec::with_capacity(local.len() + remote.len());

    for task in local {
        if seen.insert(MergeKey::for_task(task)) {
            merged.push(task.clone());
        }
    }

    for task in remote {
        let key = MergeKey::for_task(task);
        if seen.contains(&key) {
            continue;
        }
        if matches!(key, MergeKey::Id(_))
            && seen.contains(&MergeKey::Title(task.normalized_title()))
        {
            // Same-titled unconfirmed local task already holds this slot.
            continue;
        }
        seen.insert(key);
        merged.push(task.clone());
    }

    merged
}
