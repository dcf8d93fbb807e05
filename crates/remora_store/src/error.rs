//! Error types for coordination store access.

use thiserror::Error;

/// Errors surfaced by the coordination store layer.
///
/// This layer never retries: a failure is reported to the caller as soon as
/// the backend reports it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached, or the connection dropped.
    #[error("Store connection error: {0}")]
    Connection(String),

    /// The store rejected a command (wrong key type, syntax, etc.).
    #[error("Store command error: {0}")]
    Command(String),

    /// The store configuration is incomplete or malformed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Creates a [`Connection`](Self::Connection) error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a [`Command`](Self::Command) error.
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Creates a [`Config`](Self::Config) error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` if the error reflects store unavailability.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            Self::Connection(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
