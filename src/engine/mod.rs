// src/engine/mod.rs

//! Orchestration engine.
//!
//! The pure core state machine lives in [`core`]; it wraps the DAG
//! scheduler and turns every event into a list of commands. The async shell
//! in [`runtime`] owns the event channel, the retry timers and the executor
//! backend, and executes those commands.
//!
//! The core sits behind a `std::sync::Mutex` shared with the public
//! `TaskScheduler` handle, so status queries and cancellation observe the
//! same state the event loop mutates. The lock is never held across an
//! `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::TaskError;
use crate::types::TaskId;

pub mod core;
pub mod event_handlers;
pub mod retry;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use retry::{Backoff, RetryDecision, RetryPolicy};
pub use runtime::Runtime;

/// Events flowing into the runtime from attempts, timers and handles.
#[derive(Debug, Clone)]
pub enum RuntimeEvent<T> {
    /// An attempt resolved: its work finished, failed, panicked or timed out.
    AttemptFinished {
        task: TaskId,
        attempt: u32,
        outcome: Result<T, TaskError>,
    },
    /// A retry backoff elapsed.
    RetryDue { task: TaskId },
    /// Tasks were cancelled through a handle while the run was active.
    Cancelled { tasks: Vec<TaskId> },
}

impl<T> RuntimeEvent<T> {
    /// Short label for logs; avoids requiring `T: Debug`.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeEvent::AttemptFinished { outcome: Ok(_), .. } => "attempt-succeeded",
            RuntimeEvent::AttemptFinished { outcome: Err(_), .. } => "attempt-failed",
            RuntimeEvent::RetryDue { .. } => "retry-due",
            RuntimeEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// Lock the shared core, recovering from poisoning: a panic elsewhere must
/// not stop the scheduler from reporting.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
