// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task data model.

use ovl_core::id::{LaneId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Do,
    Doing,
    Done,
    Error,
    Hold,
    Abort,
    Undo,
    Undoing,
}

impl TaskStatus {
    /// A task is terminal once it can no longer block anything waiting on
    /// it: `Done`, `Error`, and `Hold` all qualify.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error | TaskStatus::Hold)
    }

    /// Aggregation priority used to derive a [`crate::Change`]'s status,
    /// highest wins: `Error > Hold > Doing > Do > Done`. `Abort`/`Undo`/
    /// `Undoing` are in-flight cancellation states that don't appear in
    /// the change-status vocabulary; they're folded
    /// into the nearest equivalent priority (Abort ~ Hold: not finished
    /// and not progressing; Undo ~ Do: pending work; Undoing ~ Doing:
    /// active work).
    pub fn agg_priority(self) -> u8 {
        match self {
            TaskStatus::Done => 0,
            TaskStatus::Do | TaskStatus::Undo => 1,
            TaskStatus::Doing | TaskStatus::Undoing => 2,
            TaskStatus::Hold | TaskStatus::Abort => 3,
            TaskStatus::Error => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub time_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub label: String,
    pub done: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    pub summary: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub lanes: BTreeSet<LaneId>,
    #[serde(default)]
    pub wait_tasks: BTreeSet<TaskId>,
    #[serde(default)]
    pub log: Vec<TaskLogEntry>,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub progress: Option<Progress>,
    pub spawn_time_ms: u64,
    /// Zero means "not yet terminal"; non-zero iff the task has reached a terminal status.
    #[serde(default)]
    pub ready_time_ms: u64,
}

impl Task {
    pub fn new(kind: impl Into<String>, summary: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id: TaskId::new(),
            kind: kind.into(),
            summary: summary.into(),
            status: TaskStatus::Do,
            lanes: BTreeSet::new(),
            wait_tasks: BTreeSet::new(),
            log: Vec::new(),
            data: serde_json::Map::new(),
            progress: None,
            spawn_time_ms: now_ms,
            ready_time_ms: 0,
        }
    }

    /// True iff status is `Do` and every waited-on task (among the given
    /// resolver) is terminal. Tasks that reference a no-longer-existing id
    /// are treated as satisfied, since a deleted task cannot block forever.
    pub fn is_ready<'a>(&self, resolve: impl Fn(&TaskId) -> Option<&'a Task>) -> bool {
        self.status == TaskStatus::Do
            && self
                .wait_tasks
                .iter()
                .all(|id| resolve(id).map(|t| t.status.is_terminal()).unwrap_or(true))
    }

    pub fn set_status(&mut self, status: TaskStatus, now_ms: u64) {
        if status.is_terminal() {
            self.ready_time_ms = now_ms;
        }
        self.status = status;
    }

    pub fn logf(&mut self, now_ms: u64, message: impl Into<String>) {
        self.log.push(TaskLogEntry { time_ms: now_ms, level: LogLevel::Info, message: message.into() });
    }

    pub fn errorf(&mut self, now_ms: u64, message: impl Into<String>) {
        self.log.push(TaskLogEntry { time_ms: now_ms, level: LogLevel::Error, message: message.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_until_waited_tasks_are_terminal() {
        let mut blocker = Task::new("start", "Start \"a\"", 0);
        let mut dependent = Task::new("start", "Start \"b\"", 0);
        dependent.wait_tasks.insert(blocker.id);

        assert!(!dependent.is_ready(|id| if *id == blocker.id { Some(&blocker) } else { None }));

        blocker.set_status(TaskStatus::Done, 10);
        assert!(dependent.is_ready(|id| if *id == blocker.id { Some(&blocker) } else { None }));
    }

    #[test]
    fn doing_task_is_never_ready_again() {
        let mut t = Task::new("start", "s", 0);
        t.status = TaskStatus::Doing;
        assert!(!t.is_ready(|_| None));
    }

    #[test]
    fn ready_time_is_zero_until_terminal() {
        let mut t = Task::new("start", "s", 0);
        assert_eq!(t.ready_time_ms, 0);
        t.set_status(TaskStatus::Doing, 5);
        assert_eq!(t.ready_time_ms, 0);
        t.set_status(TaskStatus::Done, 12);
        assert_eq!(t.ready_time_ms, 12);
    }
}
