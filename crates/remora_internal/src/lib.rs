//! # Remora Internal Library
//!
//! Re-exports the core remora crates for convenience.

/// Layer 1: coordination store access.
pub use remora_store;

/// Layer 2: resource declarations.
pub use remora_resource;

/// Layer 2: remote attributes and subscriptions.
pub use remora_attributes;

/// Layer 3: registration and instance bookkeeping.
pub use remora_registry;

/// Layer 3: dispatchers, proxies and discovery.
pub use remora_rpc;

/// Ambient infrastructure.
pub use remora_core;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use remora_attributes::{AttributeStore, Bindings, SubscriberSession};
    pub use remora_core::{TracingConfig, TracingFormat};
    pub use remora_registry::{EventKind, Registry, RegistryEvent};
    pub use remora_resource::{
        RemoteError, RemoteException, RemoteResource, Value, resource,
    };
    pub use remora_rpc::{
        Discovery, Dispatcher, Proxy, ProxyOptions, RemoteFuture, Reply, Route, RpcError,
    };
    pub use remora_store::{ResourceIdentity, Store, StoreConfig};
}
