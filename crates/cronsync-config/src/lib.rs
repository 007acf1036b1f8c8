//! Configuration management system for cronsync
//!
//! This crate loads the task list and run options for the orchestrator from
//! YAML, TOML or JSON files, layered over defaults and environment overrides.
//!
//! # Features
//!
//! - **Multiple formats**: YAML, TOML and JSON configuration files
//! - **Validation**: every task entry must name a source and a destination
//! - **Environment overrides**: `CRONSYNC__SECTION__KEY=value`
//! - **Defaults**: sensible default values for all options
//!
//! # Examples
//!
//! ```rust,no_run
//! use cronsync_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("cronsync.yaml")
//!     .add_env_prefix("CRONSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Tasks: {}", config.tasks.len());
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use cronsync_types::{ConcurrencyLimit, ControlFlag, CopyTask, ExecutionMode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for cronsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered copy tasks
    pub tasks: Vec<TaskEntry>,
    /// Scheduling configuration
    pub execution: ExecutionConfig,
    /// Copier configuration
    pub rsync: RsyncConfig,
    /// Control-plane marker configuration
    pub flags: FlagsConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Convert task entries into copy tasks
    ///
    /// Fails on the first entry with a missing or empty field.
    pub fn task_list(&self) -> ConfigResult<Vec<CopyTask>> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.to_task(index))
            .collect()
    }

    /// Effective concurrency limit for the configured execution mode
    pub fn concurrency_limit(&self) -> ConfigResult<ConcurrencyLimit> {
        let configured = ConcurrencyLimit::new(self.execution.concurrency)
            .map_err(|message| ConfigError::invalid_value("execution.concurrency", message))?;
        Ok(self.execution.mode.effective_limit(configured))
    }
}

/// One `{source, destination}` record of the task list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Directory to copy
    #[serde(default)]
    pub source: Option<PathBuf>,
    /// Directory the source is copied into
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

impl TaskEntry {
    /// Create a complete task entry
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(source: P1, destination: P2) -> Self {
        Self {
            source: Some(source.into()),
            destination: Some(destination.into()),
        }
    }

    fn to_task(&self, index: usize) -> ConfigResult<CopyTask> {
        let source = Self::required(self.source.as_ref(), index, "source")?;
        let destination = Self::required(self.destination.as_ref(), index, "destination")?;
        Ok(CopyTask::new(source.clone(), destination.clone()))
    }

    fn required<'a>(
        value: Option<&'a PathBuf>,
        index: usize,
        field: &str,
    ) -> ConfigResult<&'a PathBuf> {
        value
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or_else(|| ConfigError::missing_required(format!("tasks[{index}].{field}")))
    }
}

/// Scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Parallel (bounded) or sequential execution
    pub mode: ExecutionMode,
    /// Maximum number of copies in flight in parallel mode
    pub concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            concurrency: ConcurrencyLimit::optimal().get(),
        }
    }
}

/// Copier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsyncConfig {
    /// Copier executable, looked up on `PATH` when relative
    pub binary: PathBuf,
    /// Option string passed before the paths, split on whitespace
    pub options: String,
}

impl RsyncConfig {
    /// Option string split into arguments
    pub fn option_args(&self) -> Vec<String> {
        self.options.split_whitespace().map(str::to_string).collect()
    }
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("rsync"),
            options: "-a --delete".to_string(),
        }
    }
}

/// Control-plane marker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsConfig {
    /// Directory holding the marker files
    pub directory: PathBuf,
    /// Marker name for the running flag
    pub running: String,
    /// Marker name for the stopped flag
    pub stopped: String,
    /// Marker name for the failed flag
    pub failed: String,
}

impl FlagsConfig {
    /// Marker file name for a flag
    pub fn name_for(&self, flag: ControlFlag) -> &str {
        match flag {
            ControlFlag::Running => &self.running,
            ControlFlag::Stopped => &self.stopped,
            ControlFlag::Failed => &self.failed,
        }
    }

    /// Full marker file path for a flag
    pub fn path_for(&self, flag: ControlFlag) -> PathBuf {
        self.directory.join(self.name_for(flag))
    }
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/var/run/cronsync"),
            running: ControlFlag::Running.default_name().to_string(),
            stopped: ControlFlag::Stopped.default_name().to_string(),
            failed: ControlFlag::Failed.default_name().to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Append-only log file; stderr only when unset
    pub log_file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            json_format: false,
        }
    }
}
