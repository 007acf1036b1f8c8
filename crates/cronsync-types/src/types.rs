//! Core data types for cronsync
//!
//! This module provides the data types used throughout the orchestrator:
//! copy tasks, identifiers, control-plane flags and run outcomes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Unique identifier for one orchestrator run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunId(uuid::Uuid);

impl RunId {
    /// Create a new run ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an admitted job, assigned in admission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JobId(u64);

impl JobId {
    /// Create a job ID from its admission sequence number
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One directory to copy and the base directory it is copied into
///
/// Paths are not validated on construction: they may live on remote mounts
/// that only attach shortly before the copy runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyTask {
    /// Directory to copy
    pub source: PathBuf,
    /// Existing directory the source is copied into
    pub destination_base: PathBuf,
}

impl CopyTask {
    /// Create a new copy task
    pub fn new<P1: Into<PathBuf>, P2: Into<PathBuf>>(source: P1, destination_base: P2) -> Self {
        Self {
            source: source.into(),
            destination_base: destination_base.into(),
        }
    }

    /// `destination_base / basename(source)`
    ///
    /// A source without a final component (for example `/`) maps onto the
    /// destination base itself.
    pub fn destination_path(&self) -> PathBuf {
        match self.source.file_name() {
            Some(name) => self.destination_base.join(name),
            None => self.destination_base.clone(),
        }
    }

    /// Source path
    pub fn source(&self) -> &Path {
        &self.source
    }
}

impl std::fmt::Display for CopyTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source.display(),
            self.destination_path().display()
        )
    }
}

/// Persistent control-plane marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlFlag {
    /// An orchestrator instance is active
    Running,
    /// An operator paused scheduling
    Stopped,
    /// The last run did not complete cleanly
    Failed,
}

impl ControlFlag {
    /// All flags in display order
    pub const ALL: [Self; 3] = [Self::Running, Self::Stopped, Self::Failed];

    /// Default marker name
    pub fn default_name(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ControlFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Outcome of one orchestrator invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExitStatus {
    /// Every task completed
    Success,
    /// The stopped flag was present; nothing ran
    SkippedByStop,
    /// Another instance holds the running flag; nothing ran
    AlreadyRunning,
    /// At least one task failed or the run hit an internal error
    Failed,
    /// The process was asked to shut down mid-run
    Interrupted,
}

impl ExitStatus {
    /// Process exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success | Self::SkippedByStop => 0,
            Self::AlreadyRunning | Self::Failed | Self::Interrupted => 1,
        }
    }

    /// Check if this status is a failure
    pub fn is_failure(self) -> bool {
        self.code() != 0
    }
}

/// Result of a successful copier invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CopyOutcome {
    /// Wall-clock time spent in the copier
    pub duration: Duration,
    /// Number of output lines the copier produced
    pub output_lines: u64,
}
