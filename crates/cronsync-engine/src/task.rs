//! Job records for admitted copy tasks

use cronsync_types::{CopyError, CopyOutcome, CopyTask, JobId};
use std::time::{Duration, Instant};

/// State of an admitted job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// The copier is still working
    Running,
    /// The copier reported success
    Succeeded,
    /// The copier reported a failure
    Failed(CopyError),
}

impl JobState {
    /// Check if the job failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Exit code of a failed copier, if it reported one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed(error) => error.exit_code(),
            _ => None,
        }
    }
}

/// A task that has been admitted into execution
///
/// Owned by the scheduler from admission until it has been reaped.
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Admission-ordered identifier
    pub id: JobId,
    /// Task being executed
    pub task: CopyTask,
    /// Current state
    pub state: JobState,
    /// Admission time
    pub admitted_at: Instant,
    /// Time the terminal state was observed
    pub finished_at: Option<Instant>,
}

impl JobRecord {
    /// Create a running job record
    pub fn new(id: JobId, task: CopyTask) -> Self {
        Self {
            id,
            task,
            state: JobState::Running,
            admitted_at: Instant::now(),
            finished_at: None,
        }
    }

    /// Record the copier result
    pub fn finish(&mut self, result: Result<CopyOutcome, CopyError>) {
        self.state = match result {
            Ok(_) => JobState::Succeeded,
            Err(error) => JobState::Failed(error),
        };
        self.finished_at = Some(Instant::now());
    }

    /// Time between admission and reaping (or now, while running)
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.admitted_at)
    }

    /// Failure carried by a failed job
    pub fn error(&self) -> Option<&CopyError> {
        match &self.state {
            JobState::Failed(error) => Some(error),
            _ => None,
        }
    }
}
