use thiserror::Error;

/// Error type for token operations.
///
/// `Malformed`, `BadSignature` and `Expired` are the validation outcomes;
/// callers at a trust boundary should collapse them into a single
/// "unauthorized" answer and keep the distinction for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token is malformed: {0}")]
    Malformed(String),

    #[error("Token signature is invalid")]
    BadSignature,

    #[error("Token is expired")]
    Expired,

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Token time-to-live must be positive")]
    InvalidTtl,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}
