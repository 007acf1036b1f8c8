//! Run statistics collection

use std::time::{Duration, Instant};

/// Summary of one scheduler pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Tasks in the input list
    pub total: usize,
    /// Jobs admitted into execution
    pub admitted: usize,
    /// Jobs reaped with success
    pub succeeded: usize,
    /// Jobs reaped with failure
    pub failed: usize,
    /// Highest number of simultaneously in-flight jobs
    pub peak_in_flight: usize,
    /// Wall-clock duration of the pass
    pub elapsed: Duration,
}

impl RunReport {
    /// Tasks that were never admitted
    pub fn skipped(&self) -> usize {
        self.total.saturating_sub(self.admitted)
    }

    /// Check that every task was admitted and succeeded
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} succeeded, {} failed, {} not started, peak concurrency {}, {:.2?}",
            self.succeeded,
            self.total,
            self.failed,
            self.skipped(),
            self.peak_in_flight,
            self.elapsed
        )
    }
}

/// Counters updated by the scheduler as jobs are admitted and reaped
#[derive(Debug)]
pub struct RunStatistics {
    total: usize,
    admitted: usize,
    succeeded: usize,
    failed: usize,
    in_flight: usize,
    peak_in_flight: usize,
    started_at: Instant,
}

impl RunStatistics {
    /// Start collecting for a list of `total` tasks
    pub fn new(total: usize) -> Self {
        Self {
            total,
            admitted: 0,
            succeeded: 0,
            failed: 0,
            in_flight: 0,
            peak_in_flight: 0,
            started_at: Instant::now(),
        }
    }

    /// Record an admission
    pub fn record_admitted(&mut self) {
        self.admitted += 1;
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
    }

    /// Record a reaped job
    pub fn record_reaped(&mut self, success: bool) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Jobs currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Snapshot the counters
    pub fn report(&self) -> RunReport {
        RunReport {
            total: self.total,
            admitted: self.admitted,
            succeeded: self.succeeded,
            failed: self.failed,
            peak_in_flight: self.peak_in_flight,
            elapsed: self.started_at.elapsed(),
        }
    }
}
