//! Error types and handling for cronsync
//!
//! Two layers of errors exist. [`CopyError`] describes why a single copy task
//! failed; [`Error`] describes why a whole run (or one of its control-plane
//! operations) failed. Any task-level failure escalates to a run-level one:
//! there is no partial success.

use std::path::PathBuf;

/// Failure of a single copy task
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CopyError {
    /// Source is missing or not a directory
    #[error("Source directory not found: {path}")]
    SourceMissing {
        /// Source path that failed validation
        path: PathBuf,
    },

    /// Destination base is missing or not a directory
    #[error("Destination base directory not found: {path}")]
    DestinationBaseMissing {
        /// Destination base that failed validation
        path: PathBuf,
    },

    /// Destination directory could not be created
    #[error("Failed to create destination '{path}': {message}")]
    DestinationCreateFailed {
        /// Destination path that could not be created
        path: PathBuf,
        /// Underlying error message
        message: String,
    },

    /// Copier process could not be started
    #[error("Failed to spawn '{program}': {message}")]
    Spawn {
        /// Program that was being started
        program: String,
        /// Underlying error message
        message: String,
    },

    /// Copier exited with a non-zero status
    #[error("Copier exited with status {code}")]
    NonZeroExit {
        /// Exit code reported by the copier
        code: i32,
    },

    /// Copier was terminated by a signal
    #[error("Copier terminated by signal")]
    Terminated,

    /// Copier worker panicked or was cancelled before reporting
    #[error("Copier worker aborted: {message}")]
    Aborted {
        /// Join failure message
        message: String,
    },

    /// I/O error while supervising the copier
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },
}

impl CopyError {
    /// Check if the task failed validation before the copier was invoked
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing { .. }
                | Self::DestinationBaseMissing { .. }
                | Self::DestinationCreateFailed { .. }
        )
    }

    /// Process-style exit code for diagnostics, if the copier reported one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code } => Some(*code),
            _ => None,
        }
    }
}

/// Main error type for cronsync operations
#[derive(thiserror::Error, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// A control-plane marker could not be read or written
    #[error("Marker '{name}' error: {message}")]
    Marker {
        /// Marker name
        name: String,
        /// Error message
        message: String,
    },

    /// A copy task failed
    #[error("Copy task failed: {0}")]
    Copy(#[from] CopyError),

    /// A worker panicked or was aborted before reporting
    #[error("Job worker failed: {message}")]
    Join {
        /// Error message from the join handle
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O related errors
    Io,
    /// Configuration errors
    Config,
    /// Control-plane marker errors
    Marker,
    /// Copy task failures
    Copy,
    /// Worker join failures
    Join,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Marker { .. } => ErrorKind::Marker,
            Self::Copy(_) => ErrorKind::Copy,
            Self::Join { .. } => ErrorKind::Join,
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new marker error
    pub fn marker<N: Into<String>, S: Into<String>>(name: N, message: S) -> Self {
        Self::Marker {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a new join error
    pub fn join<S: Into<String>>(message: S) -> Self {
        Self::Join {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

impl From<std::io::Error> for CopyError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
