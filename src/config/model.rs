// src/config/model.rs

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::retry::{Backoff, RetryPolicy};
use crate::logging::LogLevel;
use crate::types::BackoffKind;

/// Default number of attempts that may run at the same time.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// max_concurrent = 4
///
/// [defaults]
/// max_attempts = 3
/// timeout = "30s"
///
/// [retry]
/// backoff = "exponential"
/// delay = "100ms"
/// max_delay = "10s"
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Per-task defaults applied when `TaskOptions` leaves a field unset.
    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerSection {
    /// Maximum number of attempts running at once. Must be >= 1.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout such as `"30s"`; absent means no timeout.
    #[serde(default)]
    pub timeout: Option<String>,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout: None,
        }
    }
}

/// `[retry]` section.
///
/// `delay` is required for `fixed` and `exponential`; `max_delay` caps the
/// exponential growth and defaults to 64 times `delay`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default)]
    pub backoff: BackoffKind,

    #[serde(default)]
    pub delay: Option<String>,

    #[serde(default)]
    pub max_delay: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Defaults applied to tasks that do not override them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    /// Always >= 1.
    pub max_attempts: u32,
    pub timeout: Option<Duration>,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            timeout: None,
        }
    }
}

/// Validated scheduler configuration.
///
/// Built from a [`RawConfigFile`] via `TryFrom` (see `validate.rs`) or
/// programmatically with the builder methods:
///
/// ```
/// use std::time::Duration;
/// use dagrun::config::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_max_concurrent(8)
///     .with_max_attempts(3)
///     .with_timeout(Duration::from_secs(10));
/// assert_eq!(config.max_concurrent.get(), 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_concurrent: NonZeroUsize,
    pub defaults: TaskDefaults,
    pub retry: RetryPolicy,
    /// Level requested by `[logging]`; applied by `logging::init_logging`.
    pub log_level: Option<LogLevel>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: NonZeroUsize::new(DEFAULT_MAX_CONCURRENT).unwrap_or(NonZeroUsize::MIN),
            defaults: TaskDefaults::default(),
            retry: RetryPolicy::default(),
            log_level: None,
        }
    }
}

impl SchedulerConfig {
    /// Values below 1 are clamped to 1.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = NonZeroUsize::new(max_concurrent).unwrap_or(NonZeroUsize::MIN);
        self
    }

    /// Values below 1 are clamped to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.defaults.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.defaults.timeout = None;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.retry = RetryPolicy::new(backoff);
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }
}
