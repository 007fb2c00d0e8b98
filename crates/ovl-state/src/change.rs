// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Change data model and the `TaskSet` grouping helper.

use crate::task::{Task, TaskStatus};
use ovl_core::id::{ChangeId, LaneId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Derived change status: the highest-priority status among its tasks, in
/// `{Error, Hold, Doing, Do, Done}` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeStatus {
    Done,
    Do,
    Doing,
    Hold,
    Error,
}

impl ChangeStatus {
    fn from_priority(p: u8) -> Self {
        match p {
            0 => ChangeStatus::Done,
            1 => ChangeStatus::Do,
            2 => ChangeStatus::Doing,
            3 => ChangeStatus::Hold,
            _ => ChangeStatus::Error,
        }
    }

    pub fn is_ready(self) -> bool {
        !matches!(self, ChangeStatus::Do | ChangeStatus::Doing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub id: ChangeId,
    pub kind: String,
    pub summary: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Ordered sequence of task ids. Insertion order is significant: a
    /// caller starting services "a", "b", "c" expects tasks back in that
    /// same order.
    pub tasks: Vec<TaskId>,
    pub spawn_time_ms: u64,
    /// Zero until every task has reached a terminal status.
    #[serde(default)]
    pub ready_time_ms: u64,
    /// First error message observed among this change's tasks, surfaced
    /// verbatim to callers via its `err` field.
    #[serde(default)]
    pub err: Option<String>,
}

impl Change {
    pub fn new(kind: impl Into<String>, summary: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: ChangeId::new(),
            kind: kind.into(),
            summary: summary.into(),
            data: serde_json::Map::new(),
            tasks: Vec::new(),
            spawn_time_ms: now_ms,
            ready_time_ms: 0,
            err: None,
        }
    }

    /// `Change.AddAll(TaskSet)`: append a group of tasks, preserving order,
    /// without duplicating ids already present.
    pub fn add_all(&mut self, set: &TaskSet) {
        for id in &set.0 {
            if !self.tasks.contains(id) {
                self.tasks.push(*id);
            }
        }
    }

    pub fn status(&self, tasks: &HashMap<TaskId, Task>) -> ChangeStatus {
        if self.tasks.is_empty() {
            return ChangeStatus::Done;
        }
        let max_priority = self
            .tasks
            .iter()
            .filter_map(|id| tasks.get(id))
            .map(|t| t.status.agg_priority())
            .max()
            .unwrap_or(0);
        ChangeStatus::from_priority(max_priority)
    }

    /// Recompute `ready_time_ms` and `err` after a task transition. Callers
    /// (the engine) invoke this once per `Ensure` pass under the state lock.
    pub fn recompute(&mut self, tasks: &HashMap<TaskId, Task>, now_ms: u64) {
        let status = self.status(tasks);
        if status.is_ready() {
            if self.ready_time_ms == 0 {
                self.ready_time_ms = now_ms;
            }
        } else {
            self.ready_time_ms = 0;
        }
        if self.err.is_none() {
            self.err = self
                .tasks
                .iter()
                .filter_map(|id| tasks.get(id))
                .find(|t| t.status == TaskStatus::Error)
                .and_then(|t| t.log.iter().rev().find(|e| matches!(e.level, crate::task::LogLevel::Error)))
                .map(|e| e.message.clone());
        }
    }

    /// All task ids tagged with the given service name in `data["service-names"]`.
    pub fn tags_service(&self, name: &str) -> bool {
        self.data
            .get("service-names")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().any(|v| v.as_str() == Some(name)))
            .unwrap_or(false)
    }

    pub fn tag_service(&mut self, name: &str) {
        let entry = self
            .data
            .entry("service-names")
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(arr) = entry {
            let already = arr.iter().any(|v| v.as_str() == Some(name));
            if !already {
                arr.push(serde_json::Value::String(name.to_string()));
            }
        }
    }
}

/// A group of tasks created together and sharing a lane, so that an error
/// in one aborts the rest of the group.
#[derive(Debug, Clone, Default)]
pub struct TaskSet(pub Vec<TaskId>);

impl TaskSet {
    pub fn new(ids: impl IntoIterator<Item = TaskId>) -> Self {
        Self(ids.into_iter().collect())
    }

    pub fn ids(&self) -> &[TaskId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add `lane` to every task in this set (resolved via `tasks`).
    pub fn assign_lane(&self, lane: LaneId, tasks: &mut HashMap<TaskId, Task>) {
        for id in &self.0 {
            if let Some(t) = tasks.get_mut(id) {
                t.lanes.insert(lane);
            }
        }
    }

    /// `B.WaitFor(A)` for every `A` in `self`, every `B` in `other`: makes
    /// every task in `other` wait on every task in `self`.
    pub fn wait_all(&self, other: &TaskSet, tasks: &mut HashMap<TaskId, Task>) {
        for b in &other.0 {
            if let Some(task) = tasks.get_mut(b) {
                for a in &self.0 {
                    task.wait_tasks.insert(*a);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn task_with(status: TaskStatus) -> Task {
        let mut t = Task::new("x", "x", 0);
        t.status = status;
        t
    }

    #[test]
    fn status_picks_highest_priority_across_tasks() {
        let mut tasks = HashMap::new();
        let a = task_with(TaskStatus::Done);
        let b = task_with(TaskStatus::Error);
        let mut change = Change::new("start", "Start services", 0);
        change.tasks = vec![a.id, b.id];
        tasks.insert(a.id, a);
        tasks.insert(b.id, b);
        assert_eq!(change.status(&tasks), ChangeStatus::Error);
    }

    #[test]
    fn empty_change_is_done() {
        let change = Change::new("replan", "Replan - no services", 0);
        assert_eq!(change.status(&HashMap::new()), ChangeStatus::Done);
    }

    #[test]
    fn add_all_preserves_order_and_dedupes() {
        let mut change = Change::new("start", "s", 0);
        let t1 = TaskId::new();
        let t2 = TaskId::new();
        change.add_all(&TaskSet::new([t1, t2]));
        change.add_all(&TaskSet::new([t1]));
        assert_eq!(change.tasks, vec![t1, t2]);
    }

    #[test]
    fn wait_all_links_every_pair() {
        let mut tasks = HashMap::new();
        let a1 = Task::new("start", "a1", 0);
        let a2 = Task::new("start", "a2", 0);
        let b1 = Task::new("start", "b1", 0);
        let (a1id, a2id, b1id) = (a1.id, a2.id, b1.id);
        tasks.insert(a1id, a1);
        tasks.insert(a2id, a2);
        tasks.insert(b1id, b1);

        let a_set = TaskSet::new([a1id, a2id]);
        let b_set = TaskSet::new([b1id]);
        a_set.wait_all(&b_set, &mut tasks);

        let b = &tasks[&b1id];
        assert!(b.wait_tasks.contains(&a1id));
        assert!(b.wait_tasks.contains(&a2id));
    }
}
