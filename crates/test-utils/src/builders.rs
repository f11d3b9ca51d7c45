use dagrun::config::{RawConfigFile, SchedulerConfig};
use dagrun::logging::LogLevel;
use dagrun::types::BackoffKind;

/// Builder for scheduler configuration in tests.
///
/// Produces either a validated [`SchedulerConfig`] or the equivalent TOML
/// text, so loader tests and runtime tests share one description.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    raw: RawConfigFile,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.raw.scheduler.max_concurrent = n;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.raw.defaults.max_attempts = n;
        self
    }

    /// Default timeout in the config's duration syntax, e.g. `"50ms"`.
    pub fn timeout(mut self, timeout: &str) -> Self {
        self.raw.defaults.timeout = Some(timeout.to_string());
        self
    }

    pub fn fixed_backoff(mut self, delay: &str) -> Self {
        self.raw.retry.backoff = BackoffKind::Fixed;
        self.raw.retry.delay = Some(delay.to_string());
        self.raw.retry.max_delay = None;
        self
    }

    pub fn exponential_backoff(mut self, delay: &str, max_delay: &str) -> Self {
        self.raw.retry.backoff = BackoffKind::Exponential;
        self.raw.retry.delay = Some(delay.to_string());
        self.raw.retry.max_delay = Some(max_delay.to_string());
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.raw.logging.level = Some(level);
        self
    }

    pub fn raw(&self) -> &RawConfigFile {
        &self.raw
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig::try_from(self.raw).expect("failed to build valid config from builder")
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("[scheduler]\n");
        out.push_str(&format!(
            "max_concurrent = {}\n\n",
            self.raw.scheduler.max_concurrent
        ));

        out.push_str("[defaults]\n");
        out.push_str(&format!("max_attempts = {}\n", self.raw.defaults.max_attempts));
        if let Some(timeout) = &self.raw.defaults.timeout {
            out.push_str(&format!("timeout = \"{timeout}\"\n"));
        }
        out.push('\n');

        out.push_str("[retry]\n");
        out.push_str(&format!("backoff = \"{}\"\n", self.raw.retry.backoff));
        if let Some(delay) = &self.raw.retry.delay {
            out.push_str(&format!("delay = \"{delay}\"\n"));
        }
        if let Some(max_delay) = &self.raw.retry.max_delay {
            out.push_str(&format!("max_delay = \"{max_delay}\"\n"));
        }

        if let Some(level) = self.raw.logging.level {
            out.push_str("\n[logging]\n");
            out.push_str(&format!("level = \"{}\"\n", level_name(level)));
        }

        out
    }
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
