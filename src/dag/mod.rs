// src/dag/mod.rs

//! Task graph and scheduling state.
//!
//! - [`graph`] holds the dependency DAG plus validation and planning.
//! - [`store`] owns every task's mutable record (status, attempts, result).
//! - [`state_manager`] applies graph-aware transitions: releasing
//!   dependents and cascading cancellation.
//! - [`scheduler`] is the synchronous state machine deciding what runs next.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`task_info`] provides task definitions and the types handed to the
//!   executor.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod store;
pub mod task_info;

pub use graph::TaskGraph;
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use store::{ResultStore, TaskRecord};
pub use task_info::{
    work_fn, RetryRequest, ScheduledAttempt, TaskSnapshot, TaskSpec, TaskStatus, WorkFn,
    WorkFuture,
};
