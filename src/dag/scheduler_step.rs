// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::{RetryRequest, ScheduledAttempt};
use crate::types::TaskId;

/// Structured result of a single scheduler "step".
///
/// The async runtime turns this into commands; tests can also drive the
/// scheduler by hand and make assertions about what changed.
#[derive(Debug, Clone)]
pub struct SchedulerStep<T> {
    /// Attempts admitted in this step, in admission order.
    pub newly_scheduled: Vec<ScheduledAttempt<T>>,
    /// Tasks that failed for good in this step.
    pub newly_failed: Vec<TaskId>,
    /// Tasks cancelled in this step (explicitly or by cascade).
    pub newly_cancelled: Vec<TaskId>,
    /// Failed tasks that will become eligible again after a delay.
    pub retries: Vec<RetryRequest>,
    /// Tasks whose outstanding retry delay no longer matters.
    pub aborted_retries: Vec<TaskId>,
    /// Whether this step moved the last task into a terminal state.
    pub run_just_finished: bool,
}

impl<T> Default for SchedulerStep<T> {
    fn default() -> Self {
        Self {
            newly_scheduled: Vec::new(),
            newly_failed: Vec::new(),
            newly_cancelled: Vec::new(),
            retries: Vec::new(),
            aborted_retries: Vec::new(),
            run_just_finished: false,
        }
    }
}

impl<T> SchedulerStep<T> {
    /// Ids of the admitted attempts, handy in assertions.
    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        self.newly_scheduled.iter().map(|a| a.task.clone()).collect()
    }
}
