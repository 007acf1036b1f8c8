//! Configuration value types for cronsync
//!
//! This module provides validated configuration values shared between the
//! configuration loader and the engine.

/// Maximum number of copy jobs allowed in flight at once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConcurrencyLimit(usize);

impl ConcurrencyLimit {
    /// Minimum concurrency (sequential execution)
    pub const MIN: usize = 1;
    /// Maximum concurrency
    pub const MAX: usize = 256;
    /// Upper bound applied to the detected default
    pub const DEFAULT_CAP: usize = 4;

    /// Sequential execution
    pub const SEQUENTIAL: Self = Self(1);

    /// Create a new concurrency limit with validation
    pub fn new(limit: usize) -> Result<Self, String> {
        if limit < Self::MIN {
            Err(format!(
                "Concurrency limit {} is below minimum {}",
                limit,
                Self::MIN
            ))
        } else if limit > Self::MAX {
            Err(format!(
                "Concurrency limit {} exceeds maximum {}",
                limit,
                Self::MAX
            ))
        } else {
            Ok(Self(limit))
        }
    }

    /// Get the limit value
    pub fn get(self) -> usize {
        self.0
    }

    /// Check if this limit means strictly sequential execution
    pub fn is_sequential(self) -> bool {
        self.0 == 1
    }

    /// Get a sensible limit for the current system
    pub fn optimal() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self(cpu_count.clamp(Self::MIN, Self::DEFAULT_CAP))
    }
}

impl Default for ConcurrencyLimit {
    fn default() -> Self {
        Self::optimal()
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the task list is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExecutionMode {
    /// Up to the configured concurrency limit at once
    #[default]
    Parallel,
    /// One task at a time, in list order
    Sequential,
}

impl ExecutionMode {
    /// Resolve the effective limit for this mode
    pub fn effective_limit(self, configured: ConcurrencyLimit) -> ConcurrencyLimit {
        match self {
            Self::Parallel => configured,
            Self::Sequential => ConcurrencyLimit::SEQUENTIAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_is_within_bounds() {
        let limit = ConcurrencyLimit::optimal();
        assert!(limit.get() >= ConcurrencyLimit::MIN);
        assert!(limit.get() <= ConcurrencyLimit::DEFAULT_CAP);
    }

    #[test]
    fn test_sequential_mode_forces_single_slot() {
        let configured = ConcurrencyLimit::new(8).unwrap();
        assert_eq!(ExecutionMode::Parallel.effective_limit(configured).get(), 8);
        assert!(ExecutionMode::Sequential
            .effective_limit(configured)
            .is_sequential());
    }

    #[test]
    fn test_limit_error_messages() {
        assert!(ConcurrencyLimit::new(0).unwrap_err().contains("below minimum"));
        assert!(ConcurrencyLimit::new(1000)
            .unwrap_err()
            .contains("exceeds maximum"));
    }
}
