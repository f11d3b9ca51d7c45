// src/dag/store.rs

//! Result store: the single owner of per-task mutable state.
//!
//! Every status change goes through [`ResultStore::transition`], which
//! enforces [`TaskStatus::can_transition_to`] and keeps the running and
//! unfinished counters in step with the records.

use std::collections::HashMap;

use tracing::debug;

use crate::dag::task_info::{TaskSnapshot, TaskStatus};
use crate::errors::{DagrunError, Result, TaskError};
use crate::types::TaskId;

/// Mutable per-task record.
#[derive(Debug, Clone)]
pub struct TaskRecord<T> {
    pub status: TaskStatus,
    /// Attempts started so far.
    pub attempts: u32,
    pub result: Option<T>,
    pub last_error: Option<TaskError>,
}

impl<T> TaskRecord<T> {
    fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            attempts: 0,
            result: None,
            last_error: None,
        }
    }
}

#[derive(Debug)]
pub struct ResultStore<T> {
    records: HashMap<TaskId, TaskRecord<T>>,
    running: usize,
    unfinished: usize,
}

impl<T> Default for ResultStore<T> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            running: 0,
            unfinished: 0,
        }
    }
}

impl<T> ResultStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh `Pending` record.
    pub fn insert(&mut self, id: &str) -> Result<()> {
        if self.records.contains_key(id) {
            return Err(DagrunError::DuplicateId(id.to_string()));
        }
        self.records.insert(id.to_string(), TaskRecord::new());
        self.unfinished += 1;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TaskRecord<T>> {
        self.records.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.records.get(id).map(|r| r.status)
    }

    /// Number of tasks currently `Running`.
    pub fn running_count(&self) -> usize {
        self.running
    }

    /// Number of tasks not yet in a terminal state.
    pub fn unfinished_count(&self) -> usize {
        self.unfinished
    }

    pub fn all_terminal(&self) -> bool {
        self.unfinished == 0
    }

    /// Apply a status change, rejecting anything outside the transition table.
    ///
    /// Returns the previous status.
    pub fn transition(&mut self, id: &str, next: TaskStatus) -> Result<TaskStatus> {
        let record = self.records.get_mut(id).ok_or_else(|| {
            DagrunError::SchedulerInvariant(format!("transition for unknown task '{id}'"))
        })?;

        let prev = record.status;
        if !prev.can_transition_to(next) {
            return Err(DagrunError::SchedulerInvariant(format!(
                "illegal transition for task '{id}': {prev} -> {next}"
            )));
        }

        record.status = next;
        if prev == TaskStatus::Running {
            self.running -= 1;
        }
        if next == TaskStatus::Running {
            self.running += 1;
        }
        if next.is_terminal() {
            self.unfinished -= 1;
        }

        debug!(task = %id, from = %prev, to = %next, "task transition");
        Ok(prev)
    }

    /// Ready -> Running, bumping the attempt counter. Returns the new attempt
    /// number.
    pub fn begin_attempt(&mut self, id: &str, max_attempts: u32) -> Result<u32> {
        let attempts = self.records.get(id).map(|r| r.attempts).unwrap_or(0);
        if attempts >= max_attempts {
            return Err(DagrunError::SchedulerInvariant(format!(
                "task '{id}' admitted after {attempts} of {max_attempts} attempts"
            )));
        }

        self.transition(id, TaskStatus::Running)?;
        let record = self.records.get_mut(id).ok_or_else(|| {
            DagrunError::SchedulerInvariant(format!("attempt for unknown task '{id}'"))
        })?;
        record.attempts += 1;
        Ok(record.attempts)
    }

    /// Running -> Succeeded with the attempt's result.
    pub fn record_success(&mut self, id: &str, value: T) -> Result<()> {
        self.transition(id, TaskStatus::Succeeded)?;
        if let Some(record) = self.records.get_mut(id) {
            record.result = Some(value);
        }
        Ok(())
    }

    /// Move a task to `next` (Failed, Cancelled or back to Pending for a
    /// retry) and remember why.
    pub fn record_error(&mut self, id: &str, next: TaskStatus, error: TaskError) -> Result<()> {
        self.transition(id, next)?;
        if let Some(record) = self.records.get_mut(id) {
            record.last_error = Some(error);
        }
        Ok(())
    }
}

impl<T: Clone> ResultStore<T> {
    pub fn snapshot(&self, id: &str) -> Option<TaskSnapshot<T>> {
        self.records.get(id).map(|r| TaskSnapshot {
            status: r.status,
            attempts: r.attempts,
            result: r.result.clone(),
            error: r.last_error.clone(),
        })
    }
}
