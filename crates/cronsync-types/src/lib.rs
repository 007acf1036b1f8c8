//! Core type system and error handling for cronsync
//!
//! This crate provides the foundational types shared by every cronsync crate:
//!
//! - **Error handling**: run-level [`Error`] and task-level [`CopyError`]
//! - **Core types**: copy tasks, run/job identifiers, control flags and exit statuses
//! - **Traits**: the [`Copier`] and [`MarkerStore`] seams the orchestrator is built against
//! - **Configuration**: validated value types such as [`ConcurrencyLimit`]
//!
//! # Features
//!
//! - `serde`: Enable serialization support
//!
//! # Examples
//!
//! ```rust
//! use cronsync_types::{CopyTask, ExitStatus};
//!
//! let task = CopyTask::new("/srv/photos", "/mnt/backup");
//! assert_eq!(task.destination_path(), std::path::PathBuf::from("/mnt/backup/photos"));
//! assert_eq!(ExitStatus::SkippedByStop.code(), 0);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{ConcurrencyLimit, ExecutionMode};
pub use error::{CopyError, Error, ErrorKind};
pub use result::Result;
pub use traits::*;
pub use types::*;
