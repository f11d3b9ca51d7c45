// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated scheduler state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events, dispatching attempts to the executor and owning retry timers.
//! The core can be unit tested without Tokio, channels or real work.

use crate::dag::{Scheduler, TaskSnapshot, TaskStatus};
use crate::engine::event_handlers::{
    handle_attempt_finished, handle_cancelled, handle_retry_due, handle_start, CoreStep,
};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::report::RunReport;
use crate::types::TaskId;

/// Pure core runtime state. It owns the DAG scheduler and performs no IO.
#[derive(Debug)]
pub struct CoreRuntime<T> {
    scheduler: Scheduler<T>,
}

impl<T> CoreRuntime<T> {
    pub fn new(scheduler: Scheduler<T>) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<T> {
        &mut self.scheduler
    }

    pub fn is_started(&self) -> bool {
        self.scheduler.is_started()
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.scheduler.status_of(task)
    }

    /// Validate the graph and produce the initial dispatches.
    pub fn start(&mut self) -> Result<CoreStep<T>> {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent<T>) -> Result<CoreStep<T>> {
        match event {
            RuntimeEvent::AttemptFinished {
                task,
                attempt,
                outcome,
            } => handle_attempt_finished(&mut self.scheduler, task, attempt, outcome),
            RuntimeEvent::RetryDue { task } => handle_retry_due(&mut self.scheduler, task),
            RuntimeEvent::Cancelled { tasks } => Ok(handle_cancelled(&mut self.scheduler, tasks)),
        }
    }

    /// Cancel `task` (and its dependents) if it has not been admitted yet.
    ///
    /// Returns every task cancelled by this call, `task` first, or an empty
    /// list when the task is running, terminal or unknown.
    pub fn cancel(&mut self, task: &str) -> Result<Vec<TaskId>> {
        let (cancelled, step) = self.scheduler.step_cancel(task)?;
        if !cancelled {
            return Ok(Vec::new());
        }
        Ok(step.newly_cancelled)
    }
}

impl<T: Clone> CoreRuntime<T> {
    pub fn snapshot(&self, task: &str) -> Option<TaskSnapshot<T>> {
        self.scheduler.snapshot(task)
    }

    pub fn report(&self) -> Result<RunReport<T>> {
        self.scheduler.report()
    }
}
