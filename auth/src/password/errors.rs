use std::time::Duration;

use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Clone, Error)]
pub enum PasswordError {
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),

    /// The stored digest cannot be parsed. This is data corruption,
    /// not a wrong password.
    #[error("Stored password digest is corrupt: {0}")]
    CorruptDigest(String),

    #[error("Invalid hashing cost: {0}")]
    InvalidCost(String),

    #[error("Password hashing timed out after {0:?}")]
    Timeout(Duration),

    #[error("Hashing worker unavailable: {0}")]
    WorkerUnavailable(String),
}
