// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawConfigFile, SchedulerConfig};
use crate::errors::Result;

/// Environment variable naming a config file for [`load_or_default`].
pub const CONFIG_ENV_VAR: &str = "DAGRUN_CONFIG";

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks value ranges, durations and backoff settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<SchedulerConfig> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    let config = SchedulerConfig::try_from(raw_config)?;
    debug!(path = %path.display(), ?config, "loaded scheduler config");
    Ok(config)
}

/// Load the file named by `DAGRUN_CONFIG`, or fall back to defaults when the
/// variable is unset.
pub fn load_or_default() -> Result<SchedulerConfig> {
    match config_path_from_env(std::env::var_os(CONFIG_ENV_VAR)) {
        Some(path) => load_and_validate(path),
        None => Ok(SchedulerConfig::default()),
    }
}

fn config_path_from_env(value: Option<std::ffi::OsString>) -> Option<PathBuf> {
    value.filter(|v| !v.is_empty()).map(PathBuf::from)
}
