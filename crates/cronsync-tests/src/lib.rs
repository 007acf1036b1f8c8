//! cronsync integration testing support
//!
//! Shared fakes and filesystem fixtures for tests that drive the run
//! controller end to end.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Unified test utilities
///
/// Scripted copiers and temporary directory layouts used across the
/// integration tests.
pub mod test_utils;
