// src/exec/task_runner.rs

//! Runs one attempt of a work item under its timeout.

use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledAttempt;
use crate::engine::RuntimeEvent;
use crate::errors::TaskError;

/// Run a single attempt and report exactly one `AttemptFinished` event.
///
/// The work item runs in its own Tokio task so a panic is contained and
/// surfaces as a failure. With a timeout the work is raced against a timer:
/// when the timer wins, `token` is cancelled, the work task is detached and
/// whatever it produces later is discarded.
pub async fn run_attempt<T: Send + 'static>(
    attempt: ScheduledAttempt<T>,
    token: CancellationToken,
    events: mpsc::UnboundedSender<RuntimeEvent<T>>,
) {
    let ScheduledAttempt {
        task,
        attempt,
        timeout,
        work,
    } = attempt;

    debug!(task = %task, attempt, ?timeout, "starting attempt");
    let started = Instant::now();

    let mut handle = tokio::spawn(work(token.clone()));

    let outcome = match timeout {
        Some(limit) => {
            tokio::select! {
                biased;
                joined = &mut handle => outcome_of(joined),
                _ = tokio::time::sleep(limit) => {
                    token.cancel();
                    warn!(task = %task, attempt, ?limit, "attempt timed out; cancelling work");
                    Err(TaskError::Timeout { after: limit })
                }
            }
        }
        None => outcome_of(handle.await),
    };

    match &outcome {
        Ok(_) => info!(task = %task, attempt, elapsed = ?started.elapsed(), "attempt finished"),
        Err(err) => debug!(task = %task, attempt, error = %err, "attempt failed"),
    }

    if events
        .send(RuntimeEvent::AttemptFinished {
            task,
            attempt,
            outcome,
        })
        .is_err()
    {
        debug!("runtime gone; dropping attempt outcome");
    }
}

fn outcome_of<T>(joined: Result<anyhow::Result<T>, JoinError>) -> Result<T, TaskError> {
    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::from_work_error(&err)),
        Err(err) if err.is_panic() => Err(TaskError::Failed {
            message: "work item panicked".to_string(),
        }),
        Err(_) => Err(TaskError::Failed {
            message: "work item was aborted".to_string(),
        }),
    }
}
