//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A capability name was not recognized.
    #[error("unknown capability: {0} (expected sql_read or sql_write)")]
    UnknownCapability(String),

    /// Failed to parse a policy file.
    #[error("failed to parse policy: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
