//! Error types for broker operations.
//!
//! "No key available" and "wait timed out" are not errors anywhere in this
//! crate; callers receive them as `None` values. The types here cover the
//! cases that genuinely fail an operation.

use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Top-level error for engine, registry, and queue operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Caller-supplied input was rejected. Never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The underlying key store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The wait queue dispatcher is not running.
    #[error("wait queue unavailable")]
    QueueUnavailable,
}

/// Key store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or the operation failed in a way that
    /// may succeed on retry.
    #[error("store operation failed: {message}")]
    Transient { message: String },

    /// An insert collided with the unique index on the subscription id.
    #[error("duplicate subscription id: {subscription_id}")]
    Duplicate { subscription_id: String },

    /// A stored document could not be decoded. Adapters log the offending
    /// id and skip the document rather than failing the whole read.
    #[error("corrupt key document {subscription_id}: {reason}")]
    Corrupt {
        subscription_id: String,
        reason: String,
    },
}

impl StoreError {
    /// Create a transient error from any message.
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Transient {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient { .. })
    }
}
