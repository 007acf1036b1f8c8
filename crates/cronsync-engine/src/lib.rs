//! Copy orchestrator for cronsync
//!
//! This crate runs a list of directory copy tasks under a concurrency limit,
//! coordinated with other invocations through three control flags.
//!
//! # Features
//!
//! - **Mutual exclusion**: a `running` flag keeps two runs from overlapping
//! - **Operator pause**: a `stopped` flag makes runs exit successfully without work
//! - **Failure latch**: a `failed` flag records that the last run did not complete
//! - **Bounded pool**: at most `limit` copier jobs in flight, fail-fast admission
//! - **Pluggable seams**: rsync and marker files in production, fakes in tests
//!
//! # Examples
//!
//! ```rust,no_run
//! use cronsync_engine::SyncEngine;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SyncEngine::new()?;
//! let status = engine.run().await;
//! std::process::exit(status.code());
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod control;
pub mod controller;
pub mod engine;
pub mod executor;
pub mod monitor;
pub mod scheduler;
pub mod task;

pub use control::{ControlPlane, FlagSnapshot, FsMarkerStore, MarkerEvent, MemoryMarkerStore, RunGuard};
pub use controller::RunController;
pub use engine::{EngineBuilder, SyncEngine};
pub use executor::{prepare_destination, CopierConfig, RsyncCopier, COPIER_LOG_TARGET};
pub use monitor::{RunReport, RunStatistics};
pub use scheduler::{FirstFailure, JobScheduler, SchedulerConfig};
pub use task::{JobRecord, JobState};
