// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning work
//! directly. This makes it easy to swap in a fake executor in tests.
//!
//! - `TokioExecutor` is the default implementation: every attempt runs on
//!   its own Tokio task via [`run_attempt`] and reports back over the
//!   runtime event channel.
//! - Tests can provide their own `ExecutorBackend` that records which
//!   attempts were dispatched and emits `AttemptFinished` events directly.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledAttempt;
use crate::engine::RuntimeEvent;
use crate::errors::Result;

use super::registry::AttemptRegistry;
use super::task_runner::run_attempt;

/// Trait abstracting how scheduled attempts are executed.
///
/// Implementations must eventually emit exactly one
/// `RuntimeEvent::AttemptFinished` per dispatched attempt.
pub trait ExecutorBackend<T>: Send {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<ScheduledAttempt<T>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend running work items on the Tokio runtime.
///
/// Dropping it cancels the tokens of every attempt still in flight.
pub struct TokioExecutor<T> {
    events: mpsc::UnboundedSender<RuntimeEvent<T>>,
    registry: AttemptRegistry,
}

impl<T> TokioExecutor<T> {
    /// Create a backend that reports outcomes on `events`.
    pub fn new(events: mpsc::UnboundedSender<RuntimeEvent<T>>) -> Self {
        Self {
            events,
            registry: AttemptRegistry::new(),
        }
    }
}

impl<T: Send + 'static> ExecutorBackend<T> for TokioExecutor<T> {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<ScheduledAttempt<T>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for attempt in attempts {
            let task = attempt.task.clone();
            let number = attempt.attempt;
            let token = self.registry.child_token();
            let handle = tokio::spawn(run_attempt(attempt, token.clone(), self.events.clone()));
            self.registry.track(task, number, token, handle);
        }

        Box::pin(async { Ok(()) })
    }
}
