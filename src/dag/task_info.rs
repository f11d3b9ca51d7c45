// src/dag/task_info.rs

//! Task definitions, status enum and the value types handed between the
//! scheduler, the runtime and the executor.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;
use crate::types::TaskId;

/// Future returned by a work item.
pub type WorkFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

/// Host-supplied work item. Called once per attempt with a token that is
/// cancelled when the attempt times out or the scheduler is torn down.
pub type WorkFn<T> = Arc<dyn Fn(CancellationToken) -> WorkFuture<T> + Send + Sync>;

/// Wrap an async closure into a [`WorkFn`].
pub fn work_fn<T, F, Fut>(f: F) -> WorkFn<T>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |token| Box::pin(f(token)) as WorkFuture<T>)
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Waiting on dependencies (or on a retry backoff).
    Pending,
    /// Dependencies satisfied; waiting for a concurrency slot.
    Ready,
    /// An attempt is in flight.
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// The complete transition table. Anything not listed is illegal.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Ready) | (Pending, Cancelled) => true,
            (Ready, Running) | (Ready, Cancelled) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Pending) => true,
            (Pending, _) | (Ready, _) | (Running, _) => false,
            (Succeeded, _) | (Failed, _) | (Cancelled, _) => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Static definition of a task as registered with `add_task`.
#[derive(Clone)]
pub struct TaskSpec<T> {
    pub id: TaskId,
    pub work: WorkFn<T>,
    /// Higher runs first.
    pub priority: i32,
    pub dependencies: Vec<TaskId>,
    /// Always >= 1.
    pub max_attempts: u32,
    /// `None` disables the per-attempt timer.
    pub timeout: Option<Duration>,
}

impl<T> fmt::Debug for TaskSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSpec")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("dependencies", &self.dependencies)
            .field("max_attempts", &self.max_attempts)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a task's entry in the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot<T> {
    pub status: TaskStatus,
    pub attempts: u32,
    pub result: Option<T>,
    pub error: Option<TaskError>,
}

/// One attempt the scheduler wants the executor to run now.
#[derive(Clone)]
pub struct ScheduledAttempt<T> {
    pub task: TaskId,
    /// 1-based attempt number; stale completions are recognised by it.
    pub attempt: u32,
    pub timeout: Option<Duration>,
    pub work: WorkFn<T>,
}

impl<T> fmt::Debug for ScheduledAttempt<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAttempt")
            .field("task", &self.task)
            .field("attempt", &self.attempt)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Request to make a task eligible again after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRequest {
    pub task: TaskId,
    pub delay: Duration,
}
