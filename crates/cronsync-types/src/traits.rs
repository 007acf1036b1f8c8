//! Core traits for cronsync
//!
//! The orchestrator is written against two seams: a [`Copier`] that performs
//! one copy task and a [`MarkerStore`] that persists control-plane flags.
//! Production code plugs in an rsync process and marker files; tests plug in
//! scripted fakes.

use crate::{ControlFlag, CopyError, CopyOutcome, CopyTask, Result};
use async_trait::async_trait;

/// Capability that copies one source tree into its destination
///
/// Copier options (binary, flags) belong to the implementation. The
/// orchestrator only observes success or failure.
#[async_trait]
pub trait Copier: Send + Sync {
    /// Copy `task.source` into `task.destination_path()`
    async fn copy(&self, task: &CopyTask) -> std::result::Result<CopyOutcome, CopyError>;

    /// Short name used in log lines
    fn name(&self) -> &str {
        "copier"
    }
}

/// Durable presence/absence storage for control-plane flags
///
/// Implementations must tolerate concurrent readers from other processes:
/// `create` and `delete` are idempotent and `exists` never blocks on them.
pub trait MarkerStore: Send + Sync {
    /// Check whether a flag is present
    fn exists(&self, flag: ControlFlag) -> Result<bool>;

    /// Make a flag present
    fn create(&self, flag: ControlFlag) -> Result<()>;

    /// Make a flag present only if it is absent
    ///
    /// Returns `false` and leaves the flag untouched when it already exists.
    /// Stores that can test-and-set atomically should override this.
    fn try_create(&self, flag: ControlFlag) -> Result<bool> {
        if self.exists(flag)? {
            return Ok(false);
        }
        self.create(flag)?;
        Ok(true)
    }

    /// Make a flag absent
    fn delete(&self, flag: ControlFlag) -> Result<()>;

    /// Human-readable location of a flag, for log lines
    fn locate(&self, flag: ControlFlag) -> String {
        flag.default_name().to_string()
    }
}
