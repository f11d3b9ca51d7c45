// src/config/mod.rs

//! Configuration loading and validation for dagrun.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate values and build a [`SchedulerConfig`] (`validate.rs`).
//! - Parse human-readable durations (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path, load_or_default, CONFIG_ENV_VAR};
pub use model::{
    DefaultsSection, LoggingSection, RawConfigFile, RetrySection, SchedulerConfig,
    SchedulerSection, TaskDefaults, DEFAULT_MAX_CONCURRENT,
};
