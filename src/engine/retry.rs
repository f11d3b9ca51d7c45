// src/engine/retry.rs

//! Retry policy: decides whether a failed attempt is re-queued and after
//! how long.

use std::time::Duration;

/// Delay inserted before a failed task becomes eligible again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Eligible again at the next scheduling opportunity.
    #[default]
    None,
    Fixed(Duration),
    /// `base * 2^(failures - 1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Backoff {
    /// Delay after the `failures`-th failed attempt (1-based).
    pub fn delay_for(&self, failures: u32) -> Duration {
        match *self {
            Backoff::None => Duration::ZERO,
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let exp = failures.saturating_sub(1).min(31);
                base.checked_mul(1u32 << exp).unwrap_or(max).min(max)
            }
        }
    }
}

/// What to do with a task whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue after `delay` (zero means immediately).
    Retry { delay: Duration },
    /// `max_attempts` used up; the task fails for good.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(backoff: Backoff) -> Self {
        Self { backoff }
    }

    /// `attempts` is the number of attempts already started, including the
    /// one that just failed.
    pub fn decide(&self, attempts: u32, max_attempts: u32) -> RetryDecision {
        if attempts < max_attempts {
            RetryDecision::Retry {
                delay: self.backoff.delay_for(attempts),
            }
        } else {
            RetryDecision::Exhausted
        }
    }
}
