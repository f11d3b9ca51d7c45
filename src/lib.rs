// src/lib.rs

//! Concurrent, dependency-aware scheduler for async work items.
//!
//! Register tasks with dependencies, priorities, retry and timeout settings,
//! then `run()` them: every task runs only after all of its dependencies
//! succeeded, at most `max_concurrent` at a time, and the run returns a
//! per-task report once everything is terminal.
//!
//! ```no_run
//! use dagrun::{TaskOptions, TaskScheduler};
//!
//! # async fn demo() -> dagrun::errors::Result<()> {
//! let sched: TaskScheduler<u32> = TaskScheduler::default();
//! sched
//!     .add_task("fetch", |_| async { Ok(1) }, TaskOptions::new())?
//!     .add_task("build", |_| async { Ok(2) }, TaskOptions::new().after("fetch"))?;
//!
//! let report = sched.run().await?;
//! assert!(report.all_succeeded());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod report;
pub mod task_scheduler;
pub mod types;

pub use config::SchedulerConfig;
pub use dag::{TaskSnapshot, TaskStatus};
pub use engine::{Backoff, RetryPolicy};
pub use errors::{CancelReason, DagrunError, TaskError};
pub use report::{RunReport, TaskReport};
pub use task_scheduler::{SchedulerControl, TaskHandle, TaskOptions, TaskScheduler};
pub use tokio_util::sync::CancellationToken;
pub use types::TaskId;
