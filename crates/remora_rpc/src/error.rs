//! Error types for remote calls.

use remora_attributes::AttributeError;
use remora_registry::RegistryError;
use remora_resource::{RemoteError, RemoteException, ResourceError};
use remora_store::{ResourceIdentity, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of remote resources.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The member is neither a registered method nor a registered attribute.
    #[error("No such remote member '{member}' on {resource}")]
    NoSuchMember {
        /// Target resource.
        resource: ResourceIdentity,
        /// Member name as accessed, suffix included.
        member: String,
    },

    /// The attribute exists but is not exposed for this kind of access.
    #[error("Attribute '{attribute}' of {resource} is not remotely {access}")]
    AttributeAccess {
        /// Target resource.
        resource: ResourceIdentity,
        /// Attribute name.
        attribute: String,
        /// `"readable"` or `"writable"`.
        access: &'static str,
    },

    /// Member access was given the wrong number of values.
    #[error("Invalid arguments for '{member}': {reason}")]
    InvalidArguments {
        /// Member name.
        member: String,
        /// What was wrong.
        reason: String,
    },

    /// No result arrived before the deadline.
    #[error("Timed out after {timeout:?} waiting for '{method}' on {resource}")]
    Timeout {
        /// Resource the caller waits on.
        resource: ResourceIdentity,
        /// Method called.
        method: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// The remote method failed; the error crossed the process boundary.
    #[error("{0}")]
    Remote(RemoteError),

    /// The store rejected or could not serve a request.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Attribute access through the store failed.
    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),

    /// Registration or instance bookkeeping failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// The resource's identity could not be resolved.
    #[error("Name error: {0}")]
    Name(#[from] ResourceError),

    /// An envelope, argument or result could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A call path was empty or otherwise unusable.
    #[error("Invalid call path: {0}")]
    InvalidPath(String),

    /// The dispatcher is in the wrong state for the request.
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
}

impl RpcError {
    /// Creates a [`Dispatcher`](Self::Dispatcher) error.
    pub fn dispatcher(msg: impl Into<String>) -> Self {
        Self::Dispatcher(msg.into())
    }

    /// The remote error, if the remote method failed.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` for [`Timeout`](Self::Timeout).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Rebuilds the typed exception a remote method raised.
    ///
    /// Returns `None` for non-remote errors and for remote errors of another
    /// kind.
    #[must_use]
    pub fn reconstruct<E: RemoteException>(&self) -> Option<E> {
        self.remote().and_then(RemoteError::reconstruct)
    }
}

/// Result alias for remote calls.
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;
    use remora_resource::kinds;

    #[test]
    fn remote_errors_display_their_kind_and_message() {
        let err = RpcError::Remote(RemoteError::new(kinds::PANIC, "boom"));
        assert_eq!(err.to_string(), "Panic: boom");
        assert!(err.remote().is_some_and(|remote| remote.is(kinds::PANIC)));
        assert!(!err.is_timeout());
    }

    #[test]
    fn timeouts_name_the_method() {
        let err = RpcError::Timeout {
            resource: ResourceIdentity::new("Calc", "main"),
            method: "add".into(),
            timeout: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Timed out after 1s waiting for 'add' on calc.main");
        assert!(err.remote().is_none());
    }
}
