use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use dagrun::dag::ScheduledAttempt;
use dagrun::engine::RuntimeEvent;
use dagrun::errors::{Result, TaskError};
use dagrun::exec::ExecutorBackend;
use dagrun::types::TaskId;
use tokio::sync::mpsc;

type Script<T> = Arc<dyn Fn(&str, u32) -> std::result::Result<T, TaskError> + Send + Sync>;

/// A fake executor that:
/// - records which attempts were dispatched, in order
/// - never calls the work item
/// - immediately reports the outcome chosen by its script
pub struct FakeExecutor<T> {
    runtime_tx: mpsc::UnboundedSender<RuntimeEvent<T>>,
    executed: Arc<Mutex<Vec<(TaskId, u32)>>>,
    script: Script<T>,
}

impl<T> FakeExecutor<T> {
    /// `script(task, attempt)` decides each attempt's outcome.
    pub fn new<S>(
        runtime_tx: mpsc::UnboundedSender<RuntimeEvent<T>>,
        executed: Arc<Mutex<Vec<(TaskId, u32)>>>,
        script: S,
    ) -> Self
    where
        S: Fn(&str, u32) -> std::result::Result<T, TaskError> + Send + Sync + 'static,
    {
        Self {
            runtime_tx,
            executed,
            script: Arc::new(script),
        }
    }
}

impl<T: Send + 'static> ExecutorBackend<T> for FakeExecutor<T> {
    fn spawn_attempts(
        &mut self,
        attempts: Vec<ScheduledAttempt<T>>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let script = Arc::clone(&self.script);

        Box::pin(async move {
            for a in attempts {
                executed
                    .lock()
                    .expect("executed log poisoned")
                    .push((a.task.clone(), a.attempt));

                let outcome = script(&a.task, a.attempt);
                tx.send(RuntimeEvent::AttemptFinished {
                    task: a.task,
                    attempt: a.attempt,
                    outcome,
                })
                .map_err(|e| anyhow::anyhow!("runtime channel closed: {e}"))?;
            }
            Ok(())
        })
    }
}
