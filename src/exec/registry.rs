// src/exec/registry.rs

//! Bookkeeping for in-flight attempts.

use std::collections::HashMap;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::TaskId;

/// Internal handle for an in-flight attempt.
///
/// - `cancel` is the attempt's child token.
/// - `handle` is the Tokio task running `run_attempt`.
struct ActiveAttempt {
    attempt: u32,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Tracks at most one active attempt per task.
///
/// Every attempt token is a child of one root token; dropping the registry
/// cancels the root, which signals every attempt that is still running.
pub struct AttemptRegistry {
    root: CancellationToken,
    active: HashMap<TaskId, ActiveAttempt>,
}

impl Default for AttemptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptRegistry {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            active: HashMap::new(),
        }
    }

    /// Fresh token for a new attempt.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Remember a spawned attempt, forgetting attempts that already finished.
    pub fn track(
        &mut self,
        task: TaskId,
        attempt: u32,
        cancel: CancellationToken,
        handle: JoinHandle<()>,
    ) {
        self.prune();

        if let Some(previous) = self.active.insert(
            task.clone(),
            ActiveAttempt {
                attempt,
                cancel,
                handle,
            },
        ) {
            // A timed-out attempt is reported before its work stops; its
            // token is already cancelled and the runner task is detached.
            debug!(
                task = %task,
                previous = previous.attempt,
                attempt,
                "replacing earlier attempt of the same task"
            );
            previous.cancel.cancel();
        }
    }

    /// Number of attempts whose runner has not finished yet.
    pub fn active_count(&self) -> usize {
        self.active
            .values()
            .filter(|a| !a.handle.is_finished())
            .count()
    }

    /// Attempt number currently tracked for `task`.
    pub fn attempt_of(&self, task: &str) -> Option<u32> {
        self.active.get(task).map(|a| a.attempt)
    }

    /// Signal every in-flight attempt.
    pub fn cancel_all(&self) {
        debug!(active = self.active.len(), "cancelling all attempts");
        self.root.cancel();
    }

    fn prune(&mut self) {
        self.active.retain(|_, a| !a.handle.is_finished());
    }
}

impl Drop for AttemptRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_registry_cancels_attempt_tokens() {
        let mut registry = AttemptRegistry::new();
        let token = registry.child_token();
        let observed = token.clone();

        let handle = tokio::spawn(async move { token.cancelled().await });
        registry.track("a".into(), 1, observed.clone(), handle);
        assert_eq!(registry.attempt_of("a"), Some(1));
        assert_eq!(registry.active_count(), 1);

        drop(registry);
        observed.cancelled().await;
        assert!(observed.is_cancelled());
    }

    #[tokio::test]
    async fn new_attempt_replaces_previous_one() {
        let mut registry = AttemptRegistry::new();
        let first = registry.child_token();
        let pending = tokio::spawn(std::future::pending::<()>());
        registry.track("a".into(), 1, first.clone(), pending);

        let second = registry.child_token();
        registry.track("a".into(), 2, second.clone(), tokio::spawn(async {}));

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.attempt_of("a"), Some(2));
    }
}
