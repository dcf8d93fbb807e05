//! Error types for registration.

use remora_resource::ResourceError;
use remora_store::StoreError;
use thiserror::Error;

/// Errors that can occur while registering or tracking resources.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The store rejected or could not serve a request.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The resource's identity could not be resolved.
    #[error("Name error: {0}")]
    Name(#[from] ResourceError),

    /// Params or an event could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
