// src/errors.rs

//! Crate-wide error types.
//!
//! [`DagrunError`] covers everything that can abort a whole run (structural
//! problems in the task graph, broken scheduler invariants, bad config).
//! [`TaskError`] is the per-task failure recorded in the result store; it
//! never escapes `run()`.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("Duplicate task id: {0}")]
    DuplicateId(TaskId),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    MissingDependency { task: TaskId, dependency: TaskId },

    #[error("Cycle detected in task graph: {}", .0.join(" -> "))]
    Cycle(Vec<TaskId>),

    #[error("Invalid task '{task}': {reason}")]
    InvalidTask { task: TaskId, reason: String },

    #[error("Scheduler invariant violated: {0}")]
    SchedulerInvariant(String),

    #[error("Scheduler has already started; the task graph is sealed")]
    AlreadyStarted,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagrunError {
    /// Structural errors are detected before anything is dispatched.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            DagrunError::DuplicateId(_)
                | DagrunError::MissingDependency { .. }
                | DagrunError::Cycle(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;

/// Why a task ended up `Cancelled`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// `cancel(id)` was called on this task.
    Explicit,
    /// A (transitive) dependency exhausted its attempts.
    AncestorFailed { ancestor: TaskId },
    /// A (transitive) dependency was cancelled.
    AncestorCancelled { ancestor: TaskId },
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Explicit => write!(f, "cancelled explicitly"),
            CancelReason::AncestorFailed { ancestor } => {
                write!(f, "ancestor '{ancestor}' failed")
            }
            CancelReason::AncestorCancelled { ancestor } => {
                write!(f, "ancestor '{ancestor}' cancelled")
            }
        }
    }
}

/// Failure of a single task, as recorded in the result store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The work item returned an error (or panicked).
    #[error("task failed: {message}")]
    Failed { message: String },

    /// The attempt did not settle within the task's timeout.
    #[error("task timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("task cancelled: {reason}")]
    Cancelled { reason: CancelReason },
}

impl TaskError {
    /// Build a `Failed` error from a work item's `anyhow::Error`, keeping the
    /// full context chain.
    pub fn from_work_error(err: &anyhow::Error) -> Self {
        TaskError::Failed {
            message: format!("{err:#}"),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskError::Timeout { .. })
    }

    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        match self {
            TaskError::Cancelled { reason } => Some(reason),
            _ => None,
        }
    }
}
