//! Error types for attribute access.

use remora_resource::ResourceError;
use remora_store::StoreError;
use thiserror::Error;

/// Errors that can occur while reading, writing or observing attributes.
#[derive(Debug, Error)]
pub enum AttributeError {
    /// The store rejected or could not serve a request.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The resource's name could not be resolved.
    #[error("Name error: {0}")]
    Name(#[from] ResourceError),

    /// A read-modify-write transform returned the wrong number of values.
    #[error("Modify error: expected {expected} values, got {actual}")]
    ModifyArity {
        /// Number of keys being modified.
        expected: usize,
        /// Number of values the transform returned.
        actual: usize,
    },

    /// A subscriber session thread failed.
    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

impl AttributeError {
    /// Creates a [`Subscriber`](Self::Subscriber).
    pub fn subscriber(msg: impl Into<String>) -> Self {
        Self::Subscriber(msg.into())
    }
}

/// Result alias for attribute operations.
pub type AttributeResult<T> = Result<T, AttributeError>;
