// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledAttempt;
use crate::dag::task_info::RetryRequest;
use crate::errors::{DagrunError, Result};
use crate::exec::ExecutorBackend;
use crate::types::TaskId;

use super::core::CoreRuntime;
use super::{lock, CoreCommand, CoreStep, RuntimeEvent};

/// Drives the DAG scheduler in response to `RuntimeEvent`s, and delegates
/// attempt execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains all scheduling
/// semantics. The shell reads events, dispatches attempts and owns the retry
/// timers. Timers still pending when the runtime is dropped are aborted.
pub struct Runtime<T, E: ExecutorBackend<T>> {
    core: Arc<Mutex<CoreRuntime<T>>>,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent<T>>,
    event_tx: mpsc::UnboundedSender<RuntimeEvent<T>>,
    executor: E,
    retry_timers: HashMap<TaskId, AbortHandle>,
}

impl<T, E: ExecutorBackend<T>> fmt::Debug for Runtime<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("retry_timers", &self.retry_timers.len())
            .finish_non_exhaustive()
    }
}

impl<T, E> Runtime<T, E>
where
    T: Send + 'static,
    E: ExecutorBackend<T>,
{
    /// `event_tx` must feed `event_rx`; it is cloned into retry timers.
    pub fn new(
        core: Arc<Mutex<CoreRuntime<T>>>,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent<T>>,
        event_tx: mpsc::UnboundedSender<RuntimeEvent<T>>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
            retry_timers: HashMap::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Executes the commands of `initial` (the step produced by starting
    ///   the core).
    /// - Consumes `RuntimeEvent`s and feeds them into the core.
    /// - Executes the commands returned by the core.
    ///
    /// Returns once the core reports that every task is terminal.
    pub async fn run(mut self, initial: CoreStep<T>) -> Result<()> {
        info!("dagrun runtime started");

        if !self.apply(initial).await? {
            info!("run finished during start");
            return Ok(());
        }

        loop {
            let Some(event) = self.event_rx.recv().await else {
                return Err(DagrunError::SchedulerInvariant(
                    "runtime event channel closed before the run finished".to_string(),
                ));
            };

            debug!(kind = event.kind(), "runtime received event");

            if let RuntimeEvent::RetryDue { task } = &event {
                self.retry_timers.remove(task);
            }

            // The guard is released before any command is awaited.
            let step = {
                let mut core = lock(&self.core);
                core.step(event)?
            };

            if !self.apply(step).await? {
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Execute every command of a step. Returns whether to keep running.
    async fn apply(&mut self, step: CoreStep<T>) -> Result<bool> {
        for command in step.commands {
            self.execute_command(command).await?;
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand<T>) -> Result<()> {
        match command {
            CoreCommand::DispatchAttempts(attempts) => {
                self.dispatch(attempts).await?;
            }
            CoreCommand::ScheduleRetry(request) => {
                self.schedule_retry(request);
            }
            CoreCommand::AbortRetry(task) => {
                if let Some(timer) = self.retry_timers.remove(&task) {
                    debug!(task = %task, "aborting retry timer");
                    timer.abort();
                }
            }
            CoreCommand::Finish => {
                info!("core reported all tasks terminal");
            }
        }
        Ok(())
    }

    async fn dispatch(&mut self, attempts: Vec<ScheduledAttempt<T>>) -> Result<()> {
        if attempts.is_empty() {
            return Ok(());
        }

        let tasks: Vec<_> = attempts
            .iter()
            .map(|a| format!("{}#{}", a.task, a.attempt))
            .collect();
        debug!(?tasks, "dispatching attempts");

        self.executor.spawn_attempts(attempts).await
    }

    fn schedule_retry(&mut self, request: RetryRequest) {
        let RetryRequest { task, delay } = request;
        let tx = self.event_tx.clone();
        let timer_task = task.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(RuntimeEvent::RetryDue { task: timer_task }).is_err() {
                debug!("runtime gone before retry timer fired");
            }
        });

        debug!(task = %task, ?delay, "retry timer armed");
        if let Some(previous) = self.retry_timers.insert(task.clone(), handle.abort_handle()) {
            warn!(task = %task, "replacing an outstanding retry timer");
            previous.abort();
        }
    }
}

impl<T, E: ExecutorBackend<T>> Drop for Runtime<T, E> {
    fn drop(&mut self) {
        for (task, timer) in self.retry_timers.drain() {
            debug!(task = %task, "releasing retry timer on teardown");
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::num::NonZeroUsize;
    use std::pin::Pin;
    use std::time::Duration;

    use super::*;
    use crate::dag::{work_fn, Scheduler, TaskSpec, TaskStatus};
    use crate::engine::retry::{Backoff, RetryPolicy};
    use crate::errors::TaskError;

    /// Completes every attempt immediately, failing the first attempt of
    /// each task.
    struct FailFirst {
        tx: mpsc::UnboundedSender<RuntimeEvent<u32>>,
        log: Arc<Mutex<Vec<(TaskId, u32)>>>,
    }

    impl ExecutorBackend<u32> for FailFirst {
        fn spawn_attempts(
            &mut self,
            attempts: Vec<ScheduledAttempt<u32>>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            let tx = self.tx.clone();
            let log = self.log.clone();
            Box::pin(async move {
                for a in attempts {
                    lock(&log).push((a.task.clone(), a.attempt));
                    let outcome = if a.attempt == 1 {
                        Err(TaskError::Failed {
                            message: "first try".into(),
                        })
                    } else {
                        Ok(a.attempt)
                    };
                    let _ = tx.send(RuntimeEvent::AttemptFinished {
                        task: a.task,
                        attempt: a.attempt,
                        outcome,
                    });
                }
                Ok(())
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_go_through_timers_and_run_completes() {
        let mut scheduler = Scheduler::new(
            NonZeroUsize::new(2).unwrap(),
            RetryPolicy::new(Backoff::Fixed(Duration::from_millis(50))),
        );
        for id in ["x", "y"] {
            scheduler
                .add_task(TaskSpec {
                    id: id.to_string(),
                    work: work_fn(|_| async { Ok(0) }),
                    priority: 0,
                    dependencies: Vec::new(),
                    max_attempts: 2,
                    timeout: None,
                })
                .unwrap();
        }

        let core = Arc::new(Mutex::new(CoreRuntime::new(scheduler)));
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = FailFirst {
            tx: tx.clone(),
            log: log.clone(),
        };

        let initial = lock(&core).start().unwrap();
        Runtime::new(core.clone(), rx, tx, executor)
            .run(initial)
            .await
            .unwrap();

        let core = lock(&core);
        assert!(core.is_finished());
        assert_eq!(core.status_of("x"), Some(TaskStatus::Succeeded));
        assert_eq!(core.snapshot("y").unwrap().attempts, 2);
        assert_eq!(lock(&log).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn invariant_violation_ends_the_run_with_an_error() {
        let mut scheduler = Scheduler::new(NonZeroUsize::new(1).unwrap(), RetryPolicy::default());
        for (id, deps) in [("a", vec![]), ("b", vec!["a".to_string()])] {
            scheduler
                .add_task(TaskSpec {
                    id: id.to_string(),
                    work: work_fn(|_| async { Ok(0) }),
                    priority: 0,
                    dependencies: deps,
                    max_attempts: 2,
                    timeout: None,
                })
                .unwrap();
        }

        let core = Arc::new(Mutex::new(CoreRuntime::new(scheduler)));
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = FailFirst {
            tx: tx.clone(),
            log: Arc::new(Mutex::new(Vec::new())),
        };

        let initial = lock(&core).start().unwrap();
        lock(&core).scheduler_mut().force_unmet("b", 2);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Runtime::new(core.clone(), rx, tx, executor).run(initial),
        )
        .await
        .expect("runtime must not hang on a stuck graph");

        match result {
            Err(DagrunError::SchedulerInvariant(msg)) => assert!(msg.contains("b"), "{msg}"),
            other => panic!("expected SchedulerInvariant, got {other:?}"),
        }
        assert_eq!(lock(&core).status_of("a"), Some(TaskStatus::Succeeded));
    }
}
