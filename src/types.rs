// src/types.rs

use std::str::FromStr;
use serde::Deserialize;

/// Canonical task identifier used throughout the crate.
pub type TaskId = String;

/// Shape of the delay inserted between a failed attempt and the next one.
///
/// - `None`: the task is eligible again at the next scheduling opportunity
///   (default).
/// - `Fixed`: always wait the configured delay.
/// - `Exponential`: double the delay after every failed attempt, up to a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    None,
    Fixed,
    Exponential,
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::None
    }
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(BackoffKind::None),
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(format!(
                "invalid backoff: {other} (expected \"none\", \"fixed\" or \"exponential\")"
            )),
        }
    }
}

impl std::fmt::Display for BackoffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BackoffKind::None => "none",
            BackoffKind::Fixed => "fixed",
            BackoffKind::Exponential => "exponential",
        };
        f.write_str(s)
    }
}
