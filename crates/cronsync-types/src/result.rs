//! Result type alias for cronsync operations

use crate::Error;

/// Result type alias for cronsync operations
pub type Result<T> = std::result::Result<T, Error>;
