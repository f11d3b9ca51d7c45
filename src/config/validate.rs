// src/config/validate.rs

use std::num::NonZeroUsize;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    DefaultsSection, RawConfigFile, RetrySection, SchedulerConfig, SchedulerSection, TaskDefaults,
};
use crate::engine::retry::{Backoff, RetryPolicy};
use crate::errors::{DagrunError, Result};
use crate::types::BackoffKind;

/// `max_delay` used for exponential backoff when none is configured.
const DEFAULT_MAX_DELAY_FACTOR: u32 = 64;

impl TryFrom<RawConfigFile> for SchedulerConfig {
    type Error = DagrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        Ok(SchedulerConfig {
            max_concurrent: validate_scheduler(&raw.scheduler)?,
            defaults: validate_defaults(&raw.defaults)?,
            retry: validate_retry(&raw.retry)?,
            log_level: raw.logging.level,
        })
    }
}

fn validate_scheduler(section: &SchedulerSection) -> Result<NonZeroUsize> {
    NonZeroUsize::new(section.max_concurrent).ok_or_else(|| {
        DagrunError::ConfigError("[scheduler].max_concurrent must be >= 1 (got 0)".to_string())
    })
}

fn validate_defaults(section: &DefaultsSection) -> Result<TaskDefaults> {
    if section.max_attempts == 0 {
        return Err(DagrunError::ConfigError(
            "[defaults].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let timeout = section
        .timeout
        .as_deref()
        .map(|raw| field_duration("[defaults].timeout", raw))
        .transpose()?;
    if timeout == Some(Duration::ZERO) {
        return Err(DagrunError::ConfigError(
            "[defaults].timeout must be greater than zero".to_string(),
        ));
    }

    Ok(TaskDefaults {
        max_attempts: section.max_attempts,
        timeout,
    })
}

fn validate_retry(section: &RetrySection) -> Result<RetryPolicy> {
    let delay = section
        .delay
        .as_deref()
        .map(|raw| field_duration("[retry].delay", raw))
        .transpose()?;
    let max_delay = section
        .max_delay
        .as_deref()
        .map(|raw| field_duration("[retry].max_delay", raw))
        .transpose()?;

    let backoff = match section.backoff {
        BackoffKind::None => Backoff::None,
        BackoffKind::Fixed => Backoff::Fixed(require_delay(section.backoff, delay)?),
        BackoffKind::Exponential => {
            let base = require_delay(section.backoff, delay)?;
            let max = max_delay.unwrap_or_else(|| base.saturating_mul(DEFAULT_MAX_DELAY_FACTOR));
            if max < base {
                return Err(DagrunError::ConfigError(format!(
                    "[retry].max_delay ({max:?}) must not be shorter than [retry].delay ({base:?})"
                )));
            }
            Backoff::Exponential { base, max }
        }
    };

    Ok(RetryPolicy::new(backoff))
}

fn require_delay(kind: BackoffKind, delay: Option<Duration>) -> Result<Duration> {
    delay.ok_or_else(|| {
        DagrunError::ConfigError(format!(
            "[retry].delay is required when backoff = \"{kind}\""
        ))
    })
}

fn field_duration(field: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| DagrunError::ConfigError(format!("{field}: {e}")))
}
