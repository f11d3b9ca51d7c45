// src/dag/scheduler.rs

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::num::NonZeroUsize;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::StateManager;
use crate::dag::store::ResultStore;
use crate::dag::task_info::{RetryRequest, ScheduledAttempt, TaskSnapshot, TaskSpec, TaskStatus};
use crate::engine::retry::{RetryDecision, RetryPolicy};
use crate::errors::{CancelReason, DagrunError, Result, TaskError};
use crate::report::{RunReport, TaskReport};
use crate::types::TaskId;

/// Entry in the ready queue. Field order gives the admission order:
/// priority descending, then insertion order ascending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    priority: i32,
    position: Reverse<usize>,
    task: TaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Tasks may still be added; nothing has been dispatched.
    Building,
    Running,
    Finished,
}

/// Scheduler holds the task graph plus all mutable scheduling state.
///
/// It is a synchronous state machine: every method applies one scheduling
/// opportunity and reports what changed as a [`SchedulerStep`]. It never
/// runs work itself; the engine turns steps into dispatches and timers.
///
/// It is responsible for:
/// - maintaining the ready set incrementally (dependency counters plus a
///   priority queue, no rescans)
/// - admitting ready tasks under the concurrency cap
/// - applying the retry policy to failed attempts
/// - cascading cancellation to dependents of failed or cancelled tasks
/// - detecting that a run can no longer make progress
pub struct Scheduler<T> {
    graph: TaskGraph,
    specs: HashMap<TaskId, TaskSpec<T>>,
    store: ResultStore<T>,
    ready: BinaryHeap<ReadyEntry>,
    /// Not-yet-succeeded dependencies per task; filled in by `start`.
    unmet: HashMap<TaskId, usize>,
    /// Pending tasks waiting out a retry backoff.
    waiting_retry: HashSet<TaskId>,
    max_concurrent: usize,
    retry: RetryPolicy,
    phase: Phase,
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.graph.len())
            .field("running", &self.store.running_count())
            .field("unfinished", &self.store.unfinished_count())
            .field("max_concurrent", &self.max_concurrent)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl<T> Scheduler<T> {
    pub fn new(max_concurrent: NonZeroUsize, retry: RetryPolicy) -> Self {
        Self {
            graph: TaskGraph::new(),
            specs: HashMap::new(),
            store: ResultStore::new(),
            ready: BinaryHeap::new(),
            unmet: HashMap::new(),
            waiting_retry: HashSet::new(),
            max_concurrent: max_concurrent.get(),
            retry,
            phase: Phase::Building,
        }
    }

    /// Register a task. Dependencies may name tasks that are added later.
    pub fn add_task(&mut self, spec: TaskSpec<T>) -> Result<()> {
        if self.phase != Phase::Building {
            return Err(DagrunError::AlreadyStarted);
        }
        if spec.max_attempts == 0 {
            return Err(DagrunError::InvalidTask {
                task: spec.id,
                reason: "max_attempts must be >= 1".to_string(),
            });
        }

        self.graph
            .add_task(&spec.id, spec.priority, &spec.dependencies)?;
        self.store.insert(&spec.id)?;
        debug!(
            task = %spec.id,
            priority = spec.priority,
            deps = ?spec.dependencies,
            max_attempts = spec.max_attempts,
            timeout = ?spec.timeout,
            "registered task"
        );
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// `true` once `start` has succeeded.
    pub fn is_started(&self) -> bool {
        self.phase != Phase::Building
    }

    /// `true` once every task is terminal after a `start`.
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn status_of(&self, task: &str) -> Option<TaskStatus> {
        self.store.status_of(task)
    }

    pub fn running_count(&self) -> usize {
        self.store.running_count()
    }

    /// Overwrite a dependency counter, to exercise the liveness check.
    #[cfg(test)]
    pub(crate) fn force_unmet(&mut self, task: &str, remaining: usize) {
        self.unmet.insert(task.to_string(), remaining);
    }

    /// Tasks waiting out a retry delay.
    pub fn waiting_retry_count(&self) -> usize {
        self.waiting_retry.len()
    }

    /// Validate the graph and take the first scheduling opportunity.
    ///
    /// Structural errors are reported before anything is admitted, and leave
    /// the scheduler in the building phase.
    pub fn start(&mut self) -> Result<SchedulerStep<T>> {
        if self.phase != Phase::Building {
            return Err(DagrunError::AlreadyStarted);
        }
        self.graph.validate()?;
        self.phase = Phase::Running;

        let mut step = SchedulerStep::default();
        let order: Vec<TaskId> = self.graph.tasks().map(str::to_string).collect();

        // Tasks cancelled before the run may have gained dependents since.
        for task in &order {
            if self.store.status_of(task) == Some(TaskStatus::Cancelled) {
                let reason = CancelReason::AncestorCancelled {
                    ancestor: task.clone(),
                };
                let mut manager = StateManager::new(&self.graph, &mut self.store);
                step.newly_cancelled
                    .extend(manager.cancel_dependents(task, reason)?);
            }
        }

        for task in &order {
            let deps = self.graph.dependency_count(task);
            self.unmet.insert(task.clone(), deps);
            if deps == 0 && self.store.status_of(task) == Some(TaskStatus::Pending) {
                StateManager::new(&self.graph, &mut self.store).mark_ready(task)?;
                self.push_ready(task);
            }
        }

        info!(
            tasks = order.len(),
            max_concurrent = self.max_concurrent,
            ready = self.ready.len(),
            "scheduler: starting run"
        );

        self.admit(&mut step)?;
        self.finish_or_check_liveness(&mut step)?;
        Ok(step)
    }

    /// Apply the outcome of one attempt.
    ///
    /// Outcomes for a task that is not running, or for an attempt number
    /// that is no longer current, are stale and ignored.
    pub fn step_completion(
        &mut self,
        task: &str,
        attempt: u32,
        outcome: std::result::Result<T, TaskError>,
    ) -> Result<SchedulerStep<T>> {
        let mut step = SchedulerStep::default();

        if self.phase != Phase::Running {
            warn!(task = %task, attempt, "completion with no active run; ignoring");
            return Ok(step);
        }

        let current = self.store.get(task).map(|r| (r.status, r.attempts));
        match current {
            Some((TaskStatus::Running, current_attempt)) if current_attempt == attempt => {}
            Some((status, current_attempt)) => {
                debug!(
                    task = %task,
                    attempt,
                    current_attempt,
                    %status,
                    "stale attempt outcome; discarding"
                );
                return Ok(step);
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return Ok(step);
            }
        }

        match outcome {
            Ok(value) => {
                self.store.record_success(task, value)?;
                info!(task = %task, attempt, "task succeeded");

                let mut manager = StateManager::new(&self.graph, &mut self.store);
                let released = manager.release_dependents(task, &mut self.unmet)?;
                for dependent in &released {
                    self.push_ready(dependent);
                }
            }
            Err(error) => self.handle_failure(task, attempt, error, &mut step)?,
        }

        self.admit(&mut step)?;
        self.finish_or_check_liveness(&mut step)?;
        Ok(step)
    }

    fn handle_failure(
        &mut self,
        task: &str,
        attempt: u32,
        error: TaskError,
        step: &mut SchedulerStep<T>,
    ) -> Result<()> {
        let max_attempts = self.specs.get(task).map(|s| s.max_attempts).unwrap_or(1);

        match self.retry.decide(attempt, max_attempts) {
            RetryDecision::Retry { delay } => {
                warn!(
                    task = %task,
                    attempt,
                    max_attempts,
                    error = %error,
                    ?delay,
                    "attempt failed; will retry"
                );
                self.store.record_error(task, TaskStatus::Pending, error)?;

                if delay.is_zero() {
                    StateManager::new(&self.graph, &mut self.store).mark_ready(task)?;
                    self.push_ready(task);
                } else {
                    self.waiting_retry.insert(task.to_string());
                    step.retries.push(RetryRequest {
                        task: task.to_string(),
                        delay,
                    });
                }
            }
            RetryDecision::Exhausted => {
                warn!(
                    task = %task,
                    attempts = attempt,
                    error = %error,
                    "task failed; cancelling dependents"
                );
                self.store.record_error(task, TaskStatus::Failed, error)?;
                step.newly_failed.push(task.to_string());

                let reason = CancelReason::AncestorFailed {
                    ancestor: task.to_string(),
                };
                let mut manager = StateManager::new(&self.graph, &mut self.store);
                step.newly_cancelled
                    .extend(manager.cancel_dependents(task, reason)?);
            }
        }

        Ok(())
    }

    /// A retry delay elapsed: make the task eligible again.
    pub fn step_retry_due(&mut self, task: &str) -> Result<SchedulerStep<T>> {
        let mut step = SchedulerStep::default();

        if !self.waiting_retry.remove(task) {
            debug!(task = %task, "retry timer for task no longer waiting; ignoring");
            return Ok(step);
        }

        if self.store.status_of(task) == Some(TaskStatus::Pending) {
            debug!(task = %task, "retry delay elapsed; marking Ready");
            StateManager::new(&self.graph, &mut self.store).mark_ready(task)?;
            self.push_ready(task);
        }

        if self.phase == Phase::Running {
            self.admit(&mut step)?;
            self.finish_or_check_liveness(&mut step)?;
        }
        Ok(step)
    }

    /// Cancel a task that has not been admitted yet, cascading to its
    /// dependents.
    ///
    /// Returns `false` (and an empty step) for running, terminal or unknown
    /// tasks.
    pub fn step_cancel(&mut self, task: &str) -> Result<(bool, SchedulerStep<T>)> {
        let mut step = SchedulerStep::default();

        match self.store.status_of(task) {
            Some(TaskStatus::Pending) | Some(TaskStatus::Ready) => {}
            Some(status) => {
                debug!(task = %task, %status, "cancel ignored; task already admitted or terminal");
                return Ok((false, step));
            }
            None => {
                debug!(task = %task, "cancel for unknown task; ignoring");
                return Ok((false, step));
            }
        }

        self.store.record_error(
            task,
            TaskStatus::Cancelled,
            TaskError::Cancelled {
                reason: CancelReason::Explicit,
            },
        )?;
        info!(task = %task, "task cancelled");
        step.newly_cancelled.push(task.to_string());

        if self.waiting_retry.remove(task) {
            step.aborted_retries.push(task.to_string());
        }

        let reason = CancelReason::AncestorCancelled {
            ancestor: task.to_string(),
        };
        let mut manager = StateManager::new(&self.graph, &mut self.store);
        step.newly_cancelled
            .extend(manager.cancel_dependents(task, reason)?);

        if self.phase == Phase::Running {
            self.finish_or_check_liveness(&mut step)?;
        }
        Ok((true, step))
    }

    fn push_ready(&mut self, task: &str) {
        let priority = self.graph.priority_of(task).unwrap_or(0);
        let position = self.graph.position_of(task).unwrap_or(usize::MAX);
        self.ready.push(ReadyEntry {
            priority,
            position: Reverse(position),
            task: task.to_string(),
        });
    }

    /// Admit ready tasks, best first, until the slots are used up.
    fn admit(&mut self, step: &mut SchedulerStep<T>) -> Result<()> {
        while self.store.running_count() < self.max_concurrent {
            let Some(entry) = self.ready.pop() else {
                break;
            };

            // Entries of tasks cancelled while queued are skipped lazily.
            if self.store.status_of(&entry.task) != Some(TaskStatus::Ready) {
                continue;
            }

            let Some(spec) = self.specs.get(&entry.task) else {
                return Err(DagrunError::SchedulerInvariant(format!(
                    "ready task '{}' has no definition",
                    entry.task
                )));
            };

            let attempt = self.store.begin_attempt(&entry.task, spec.max_attempts)?;
            info!(
                task = %entry.task,
                attempt,
                max_attempts = spec.max_attempts,
                priority = entry.priority,
                running = self.store.running_count(),
                "admitting task"
            );

            step.newly_scheduled.push(ScheduledAttempt {
                task: entry.task.clone(),
                attempt,
                timeout: spec.timeout,
                work: spec.work.clone(),
            });
        }

        Ok(())
    }

    /// Mark the run finished once every task is terminal; otherwise make sure
    /// something can still move.
    fn finish_or_check_liveness(&mut self, step: &mut SchedulerStep<T>) -> Result<()> {
        if self.phase != Phase::Running {
            return Ok(());
        }

        if self.store.all_terminal() {
            info!("scheduler: all tasks terminal; marking run as finished");
            self.phase = Phase::Finished;
            step.run_just_finished = true;
            return Ok(());
        }

        if self.store.running_count() == 0 && self.ready.is_empty() && self.waiting_retry.is_empty()
        {
            let stuck: Vec<&str> = self
                .graph
                .tasks()
                .filter(|t| {
                    self.store
                        .status_of(t)
                        .is_some_and(|s| !s.is_terminal())
                })
                .collect();
            return Err(DagrunError::SchedulerInvariant(format!(
                "no task running or ready, but {} task(s) can never start: {}",
                stuck.len(),
                stuck.join(", ")
            )));
        }

        Ok(())
    }
}

impl<T: Clone> Scheduler<T> {
    pub fn snapshot(&self, task: &str) -> Option<TaskSnapshot<T>> {
        self.store.snapshot(task)
    }

    /// Per-task outcome of a finished run.
    pub fn report(&self) -> Result<RunReport<T>> {
        let mut report = RunReport::new();

        for task in self.graph.tasks() {
            let record = self.store.get(task).ok_or_else(|| {
                DagrunError::SchedulerInvariant(format!("task '{task}' has no record"))
            })?;

            let outcome = match (record.status, &record.result, &record.last_error) {
                (TaskStatus::Succeeded, Some(value), _) => Ok(value.clone()),
                (TaskStatus::Failed | TaskStatus::Cancelled, _, Some(error)) => {
                    Err(error.clone())
                }
                (status, _, _) => {
                    return Err(DagrunError::SchedulerInvariant(format!(
                        "task '{task}' has no final outcome (status {status})"
                    )));
                }
            };

            report.insert(
                task.to_string(),
                TaskReport {
                    status: record.status,
                    attempts: record.attempts,
                    outcome,
                },
            );
        }

        Ok(report)
    }
}
