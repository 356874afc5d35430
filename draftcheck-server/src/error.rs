//! Error kinds surfaced by the check lifecycle and rate limiter.
//!
//! These are deliberately typed (rather than `anyhow`) so callers can
//! distinguish a caller-ordering bug (`NotFound`) from a budget refusal
//! (`Exceeded`) from infrastructure failure (`Unavailable`).

use thiserror::Error;

/// Failure of the underlying key-value store.
///
/// Propagated untouched: the core performs no retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from check lifecycle operations.
#[derive(Debug, Error)]
pub enum CheckError {
    /// `transition` was called for a key with no record. Admission must
    /// precede any transition, so this indicates a caller bug.
    #[error("no check record exists for key {key}")]
    NotFound { key: String },

    /// A stored record could not be decoded. Reads fail closed rather than
    /// coercing malformed data.
    #[error("stored check record at {key} is malformed")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from rate limiter operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// A per-window budget would be (or was) exceeded. The caller should
    /// abort the attempt and surface a back-off message to the user.
    #[error("rate limit exceeded: {0}")]
    Exceeded(String),

    #[error("stored rate-limit counter is malformed")]
    Corrupt(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
