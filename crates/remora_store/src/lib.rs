//! Coordination store client for remora.
//!
//! All cross-process state lives in a shared store. This crate is the only
//! layer that talks to it and contains no protocol logic of its own:
//!
//! - [`Connection`] / [`Backend`]: the primitive set (atomic hash and
//!   string ops, blocking list moves, watch + conditional exec, pub/sub)
//! - [`RedisBackend`]: Redis-compatible server via the `redis` crate
//! - [`MemoryBackend`]: in-process implementation with identical semantics
//! - [`transaction`]: the watch/read/write/retry loop
//! - [`keys`]: dot-separated key namespacing rooted at `<class>.<name>`
//! - [`Store`] / [`StoreClient`]: connection factory and per-identity client
//!
//! Failures surface as [`StoreError`]; nothing here retries on its own
//! except the optimistic-transaction loop, which retries only on conflict.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_backend;
pub mod transaction;

pub use client::{Store, StoreClient, replace_hash_ops};
pub use config::StoreConfig;
pub use connection::{Backend, Connection, Message, WriteOp};
pub use error::{StoreError, StoreResult};
pub use keys::{Keys, ResourceIdentity, namespace};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use transaction::{Transaction, transaction};
