// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::dag::{ScheduledAttempt, Scheduler, SchedulerStep};
use crate::dag::task_info::RetryRequest;
use crate::errors::{Result, TaskError};
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand<T> {
    /// Hand these attempts to the executor.
    DispatchAttempts(Vec<ScheduledAttempt<T>>),
    /// Start a timer that emits `RetryDue` once the delay elapses.
    ScheduleRetry(RetryRequest),
    /// Drop the outstanding retry timer of a task.
    AbortRetry(TaskId),
    /// Every task is terminal.
    Finish,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep<T> {
    pub commands: Vec<CoreCommand<T>>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl<T> CoreStep<T> {
    /// Translate a scheduler step into shell commands.
    ///
    /// Dispatches come first so slots freed by this step are refilled before
    /// timers are touched.
    pub fn from_scheduler(step: SchedulerStep<T>, finished: bool) -> Self {
        let mut commands = Vec::new();

        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchAttempts(step.newly_scheduled));
        }
        commands.extend(step.retries.into_iter().map(CoreCommand::ScheduleRetry));
        commands.extend(step.aborted_retries.into_iter().map(CoreCommand::AbortRetry));

        if finished {
            commands.push(CoreCommand::Finish);
        }

        Self {
            commands,
            keep_running: !finished,
        }
    }
}

/// Seed the run: validate the graph and admit the first attempts.
pub fn handle_start<T>(scheduler: &mut Scheduler<T>) -> Result<CoreStep<T>> {
    let step = scheduler.start()?;
    Ok(CoreStep::from_scheduler(step, scheduler.is_finished()))
}

/// Handle the resolution of one attempt.
pub fn handle_attempt_finished<T>(
    scheduler: &mut Scheduler<T>,
    task: TaskId,
    attempt: u32,
    outcome: std::result::Result<T, TaskError>,
) -> Result<CoreStep<T>> {
    let step = scheduler.step_completion(&task, attempt, outcome)?;
    Ok(CoreStep::from_scheduler(step, scheduler.is_finished()))
}

/// Handle an elapsed retry delay.
pub fn handle_retry_due<T>(scheduler: &mut Scheduler<T>, task: TaskId) -> Result<CoreStep<T>> {
    let step = scheduler.step_retry_due(&task)?;
    Ok(CoreStep::from_scheduler(step, scheduler.is_finished()))
}

/// Tasks were already cancelled through a handle; the loop only has to drop
/// their timers and notice whether that ended the run.
pub fn handle_cancelled<T>(scheduler: &mut Scheduler<T>, tasks: Vec<TaskId>) -> CoreStep<T> {
    debug!(?tasks, "applying external cancellation");

    let mut commands: Vec<CoreCommand<T>> =
        tasks.into_iter().map(CoreCommand::AbortRetry).collect();

    let finished = scheduler.is_finished();
    if finished {
        commands.push(CoreCommand::Finish);
    }

    CoreStep {
        commands,
        keep_running: !finished,
    }
}
