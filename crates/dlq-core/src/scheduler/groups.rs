//! FIFO of task groups plus the group currently being drained.
//!
//! A group keeps every id it was given; the dispatch scan skips ids that are
//! no longer QUEUED rather than removing them. Only ids missing from the
//! registry (evicted) are pruned.

use serde::Serialize;
use std::collections::VecDeque;

use crate::registry::{GroupKey, TaskId, TaskRegistry, TaskState};

#[derive(Debug)]
pub(super) struct Group {
    pub(super) key: GroupKey,
    pub(super) task_ids: Vec<TaskId>,
}

/// Group keys in drain order, for status display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupSnapshot {
    pub current: Option<String>,
    pub queued: Vec<String>,
}

#[derive(Debug, Default)]
pub(super) struct GroupQueue {
    current: Option<Group>,
    queued: VecDeque<Group>,
}

impl GroupQueue {
    /// Append `id` to the pending group for `key`, creating the group at the
    /// tail if none is pending. The group being drained is never extended, so
    /// a late member waits behind every group created before it.
    pub(super) fn push(&mut self, key: GroupKey, id: TaskId) {
        if let Some(group) = self.queued.iter_mut().find(|g| g.key == key) {
            group.task_ids.push(id);
            return;
        }
        self.queued.push_back(Group {
            key,
            task_ids: vec![id],
        });
    }

    /// First QUEUED task of the current group, advancing to the next group
    /// whenever the current one has none left. `None` when every group is exhausted.
    pub(super) fn next_queued(&mut self, registry: &TaskRegistry) -> Option<TaskId> {
        loop {
            if self.current.is_none() {
                self.current = Some(self.queued.pop_front()?);
            }
            let group = self.current.as_mut()?;

            let mut found = None;
            let mut orphans = Vec::new();
            for &id in &group.task_ids {
                match registry.state_of(id) {
                    Some(TaskState::Queued) => {
                        found = Some(id);
                        break;
                    }
                    Some(_) => {}
                    None => orphans.push(id),
                }
            }
            if !orphans.is_empty() {
                tracing::warn!(
                    group = %group.key,
                    "group references evicted task(s) {:?}; skipping",
                    orphans
                );
                group.task_ids.retain(|id| !orphans.contains(id));
            }
            if found.is_some() {
                return found;
            }
            tracing::debug!(group = %group.key, "group drained");
            self.current = None;
        }
    }

    /// Drop the current group if none of its tasks can still run or be
    /// dispatched. Returns true if a group was released.
    pub(super) fn release_if_drained(&mut self, registry: &TaskRegistry) -> bool {
        let drained = match &self.current {
            Some(group) => group.task_ids.iter().all(|&id| {
                registry
                    .state_of(id)
                    .map_or(true, TaskState::is_terminal)
            }),
            None => false,
        };
        if drained {
            self.current = None;
        }
        drained
    }

    pub(super) fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            current: self.current.as_ref().map(|g| g.key.to_string()),
            queued: self.queued.iter().map(|g| g.key.to_string()).collect(),
        }
    }
}
