#![allow(dead_code, unused_imports)]

use std::error::Error;

pub use dagrun_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Ids of `(task, attempt)` pairs, attempt numbers dropped.
pub fn task_names(executed: &[(String, u32)]) -> Vec<&str> {
    executed.iter().map(|(t, _)| t.as_str()).collect()
}
