// src/task_scheduler.rs

//! Public entry point: register tasks, run them, query and cancel them.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{load_and_validate, SchedulerConfig};
use crate::dag::{work_fn, Scheduler, TaskSnapshot, TaskSpec, TaskStatus};
use crate::engine::{lock, CoreRuntime, Runtime, RuntimeEvent};
use crate::errors::{DagrunError, Result};
use crate::exec::TokioExecutor;
use crate::report::RunReport;
use crate::types::TaskId;

type WakeSlot<T> = Arc<Mutex<Option<mpsc::UnboundedSender<RuntimeEvent<T>>>>>;

/// Per-task options. Unset fields fall back to the scheduler's defaults.
///
/// ```
/// use std::time::Duration;
/// use dagrun::TaskOptions;
///
/// let opts = TaskOptions::new()
///     .priority(5)
///     .after("fetch")
///     .max_attempts(3)
///     .timeout(Duration::from_secs(2));
/// assert_eq!(opts.dependencies(), ["fetch".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    priority: i32,
    dependencies: Vec<TaskId>,
    max_attempts: Option<u32>,
    timeout: Option<Option<Duration>>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Higher priority is admitted first among ready tasks.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add one dependency.
    pub fn after(mut self, task: impl Into<TaskId>) -> Self {
        self.dependencies.push(task.into());
        self
    }

    /// Add several dependencies.
    pub fn depends_on<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies.extend(tasks.into_iter().map(Into::into));
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(Some(timeout));
        self
    }

    /// Disable the timeout even if the scheduler has a default one.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }
}

/// Concurrent, dependency-aware scheduler for async work items.
///
/// Tasks are registered with [`TaskScheduler::add_task`] and executed by
/// [`TaskScheduler::run`]. All state lives behind one mutex shared with the
/// event loop, so [`get_status`](TaskScheduler::get_status) and
/// [`cancel`](TaskScheduler::cancel) may be called from any task while a run
/// is in progress.
pub struct TaskScheduler<T> {
    config: SchedulerConfig,
    core: Arc<Mutex<CoreRuntime<T>>>,
    /// Sender into the active run's event loop; `None` outside `run()`.
    wake: WakeSlot<T>,
}

impl<T> std::fmt::Debug for TaskScheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<T: Clone + Send + Sync + 'static> TaskScheduler<T> {
    pub fn new(config: SchedulerConfig) -> Self {
        let scheduler = Scheduler::new(config.max_concurrent, config.retry);
        Self {
            config,
            core: Arc::new(Mutex::new(CoreRuntime::new(scheduler))),
            wake: Arc::new(Mutex::new(None)),
        }
    }

    /// Build a scheduler from a TOML config file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(load_and_validate(path)?))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a task.
    ///
    /// Dependencies may name tasks that are registered later; they are
    /// resolved when the run starts.
    pub fn add_task<F, Fut>(
        &self,
        id: impl Into<TaskId>,
        work: F,
        options: TaskOptions,
    ) -> Result<TaskHandle<'_, T>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let id = id.into();
        let spec = TaskSpec {
            id: id.clone(),
            work: work_fn(work),
            priority: options.priority,
            dependencies: options.dependencies,
            max_attempts: options
                .max_attempts
                .unwrap_or(self.config.defaults.max_attempts),
            timeout: options.timeout.unwrap_or(self.config.defaults.timeout),
        };

        lock(&self.core).scheduler_mut().add_task(spec)?;
        Ok(TaskHandle {
            scheduler: self,
            id,
        })
    }

    /// Execute every registered task and return once all are terminal.
    ///
    /// Structural problems (`Cycle`, `MissingDependency`) are reported before
    /// anything runs. Individual task failures never make this fail; they
    /// show up in the report. Calling `run` again after it finished returns
    /// the same report without executing anything.
    ///
    /// Dropping the returned future before it completes (for example under
    /// a caller-side timeout) tears down the in-flight attempts and retry
    /// timers but leaves the scheduler marked as running: later calls to
    /// `run` return `AlreadyStarted` and `get_status` keeps showing the
    /// abandoned tasks as `Running`. Use a fresh scheduler after that.
    pub async fn run(&self) -> Result<RunReport<T>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let initial = {
            let mut core = lock(&self.core);
            if core.is_finished() {
                info!("run already finished; returning previous report");
                return core.report();
            }
            if core.is_started() {
                return Err(DagrunError::AlreadyStarted);
            }

            let step = core.start()?;
            *lock(&self.wake) = Some(tx.clone());
            step
        };
        let _wake_guard = WakeGuard(&self.wake);

        info!(
            max_concurrent = self.config.max_concurrent.get(),
            "starting run"
        );

        let executor = TokioExecutor::new(tx.clone());
        Runtime::new(self.core.clone(), rx, tx, executor)
            .run(initial)
            .await?;

        let report = lock(&self.core).report()?;
        info!(
            tasks = report.len(),
            succeeded = report.count(TaskStatus::Succeeded),
            failed = report.count(TaskStatus::Failed),
            cancelled = report.count(TaskStatus::Cancelled),
            "run finished"
        );
        Ok(report)
    }

    /// Cancel a task that has not started running, together with everything
    /// that depends on it.
    ///
    /// Returns `false` for running, finished or unknown tasks.
    pub fn cancel(&self, id: &str) -> bool {
        cancel_in(&self.core, &self.wake, id)
    }

    /// Point-in-time view of a task.
    pub fn get_status(&self, id: &str) -> Option<TaskSnapshot<T>> {
        lock(&self.core).snapshot(id)
    }

    /// Execution order the scheduler would follow with one slot and no
    /// failures.
    pub fn plan(&self) -> Result<Vec<TaskId>> {
        lock(&self.core).scheduler().graph().topological_order()
    }

    /// Cloneable handle for cancelling and inspecting tasks from elsewhere,
    /// for example from inside a work item.
    pub fn control(&self) -> SchedulerControl<T> {
        SchedulerControl {
            core: self.core.clone(),
            wake: self.wake.clone(),
        }
    }
}

/// Returned by [`TaskScheduler::add_task`].
pub struct TaskHandle<'a, T> {
    scheduler: &'a TaskScheduler<T>,
    id: TaskId,
}

impl<T> std::fmt::Debug for TaskHandle<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

impl<'a, T: Clone + Send + Sync + 'static> TaskHandle<'a, T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> Option<TaskStatus> {
        lock(&self.scheduler.core).status_of(&self.id)
    }

    pub fn cancel(&self) -> bool {
        self.scheduler.cancel(&self.id)
    }

    /// Register another task; allows chaining registrations.
    pub fn add_task<F, Fut>(
        self,
        id: impl Into<TaskId>,
        work: F,
        options: TaskOptions,
    ) -> Result<TaskHandle<'a, T>>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.scheduler.add_task(id, work, options)
    }
}

/// Cloneable, `'static` counterpart of [`TaskScheduler::cancel`] and
/// [`TaskScheduler::get_status`].
pub struct SchedulerControl<T> {
    core: Arc<Mutex<CoreRuntime<T>>>,
    wake: WakeSlot<T>,
}

impl<T> Clone for SchedulerControl<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            wake: self.wake.clone(),
        }
    }
}

impl<T: Clone> SchedulerControl<T> {
    pub fn cancel(&self, id: &str) -> bool {
        cancel_in(&self.core, &self.wake, id)
    }

    pub fn get_status(&self, id: &str) -> Option<TaskSnapshot<T>> {
        lock(&self.core).snapshot(id)
    }
}

fn cancel_in<T>(
    core: &Mutex<CoreRuntime<T>>,
    wake: &Mutex<Option<mpsc::UnboundedSender<RuntimeEvent<T>>>>,
    id: &str,
) -> bool {
    // Lock order: core, then wake.
    let mut core = lock(core);
    let cancelled = match core.cancel(id) {
        Ok(cancelled) => cancelled,
        Err(err) => {
            warn!(task = %id, error = %err, "cancel failed");
            return false;
        }
    };
    if cancelled.is_empty() {
        return false;
    }

    if let Some(tx) = lock(wake).as_ref() {
        if tx.send(RuntimeEvent::Cancelled { tasks: cancelled }).is_err() {
            warn!(task = %id, "run loop gone; cancellation not delivered");
        }
    }
    true
}

/// Clears the wake slot when `run` returns or is dropped.
struct WakeGuard<'a, T>(&'a Mutex<Option<mpsc::UnboundedSender<RuntimeEvent<T>>>>);

impl<T> Drop for WakeGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.0).take();
    }
}
