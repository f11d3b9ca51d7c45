// src/exec/mod.rs

//! Work execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `TokioExecutor`, which tests can replace with a fake implementation.
//! - [`registry`] tracks in-flight attempts and their cancellation tokens.
//! - [`task_runner`] runs a single attempt under its timeout and reports the
//!   outcome back to the runtime.

pub mod backend;
pub mod registry;
pub mod task_runner;

pub use backend::{ExecutorBackend, TokioExecutor};
pub use registry::AttemptRegistry;
pub use task_runner::run_attempt;
