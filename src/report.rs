// src/report.rs

//! Per-task outcome of a completed run.

use std::collections::BTreeMap;

use crate::dag::task_info::TaskStatus;
use crate::errors::TaskError;
use crate::types::TaskId;

/// Final state of one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskReport<T> {
    pub status: TaskStatus,
    /// Attempts actually executed.
    pub attempts: u32,
    pub outcome: Result<T, TaskError>,
}

impl<T> TaskReport<T> {
    pub fn success(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&TaskError> {
        self.outcome.as_ref().err()
    }
}

/// Outcome of every registered task, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport<T> {
    tasks: BTreeMap<TaskId, TaskReport<T>>,
}

impl<T> Default for RunReport<T> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }
}

impl<T> RunReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, task: TaskId, report: TaskReport<T>) {
        self.tasks.insert(task, report);
    }

    pub fn get(&self, task: &str) -> Option<&TaskReport<T>> {
        self.tasks.get(task)
    }

    /// Shorthand for the successful result of `task`.
    pub fn result(&self, task: &str) -> Option<&T> {
        self.get(task).and_then(TaskReport::success)
    }

    pub fn status(&self, task: &str) -> Option<TaskStatus> {
        self.get(task).map(|r| r.status)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &TaskReport<T>)> {
        self.tasks.iter()
    }

    /// Number of tasks that ended in `status`.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.values().filter(|r| r.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.tasks
            .values()
            .all(|r| r.status == TaskStatus::Succeeded)
    }

    pub fn into_inner(self) -> BTreeMap<TaskId, TaskReport<T>> {
        self.tasks
    }
}
