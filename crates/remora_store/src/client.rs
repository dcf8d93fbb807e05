//! Store handles and the per-identity client.

use crate::config::StoreConfig;
use crate::connection::{Backend, Connection, WriteOp};
use crate::error::StoreResult;
use crate::keys::{Keys, ResourceIdentity};
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;
use crate::transaction::{Transaction, transaction};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cloneable handle to a coordination store backend.
///
/// A `Store` holds no connection itself; each [`connect`](Self::connect)
/// opens a fresh one so blocking work never shares a socket.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl Store {
    /// Wraps an arbitrary backend.
    pub fn new(backend: impl Backend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store backed by a Redis-compatible server.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the settings are malformed.
    pub fn redis(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Self::new(RedisBackend::new(config)?))
    }

    /// Store configured from `REMORA_REDIS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the variables are missing or invalid.
    pub fn from_env() -> StoreResult<Self> {
        Self::redis(&StoreConfig::from_env()?)
    }

    /// Fresh in-process store.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the backend is unreachable.
    pub fn connect(&self) -> StoreResult<Box<dyn Connection>> {
        self.backend.connect()
    }

    /// Opens a client scoped to one resource identity.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the backend is unreachable.
    pub fn client(&self, identity: ResourceIdentity) -> StoreResult<StoreClient> {
        Ok(StoreClient {
            keys: identity.keys(),
            identity,
            conn: self.connect()?,
        })
    }

    /// Number of keys currently held by the store.
    ///
    /// # Errors
    ///
    /// Returns a connectivity error if the backend is unreachable.
    pub fn key_count(&self) -> StoreResult<u64> {
        self.connect()?.key_count()
    }
}

/// Writes that turn the hash at `key` into exactly `desired`.
///
/// Empty when the hash already matches, so callers can skip the write.
#[must_use]
pub fn replace_hash_ops(
    key: &str,
    current: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> Vec<WriteOp> {
    if current == desired {
        return Vec::new();
    }
    let mut ops = vec![WriteOp::del(key)];
    ops.extend(
        desired
            .iter()
            .map(|(field, value)| WriteOp::hset(key, field, value)),
    );
    ops
}

/// Store access for one resource identity.
///
/// Owns a dedicated connection; the higher layers use one client per
/// worker or per blocking caller.
pub struct StoreClient {
    identity: ResourceIdentity,
    keys: Keys,
    conn: Box<dyn Connection>,
}

impl core::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoreClient")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl StoreClient {
    /// The identity this client is scoped to.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Key builder for the identity.
    #[must_use]
    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    /// The underlying connection, for primitives not wrapped here.
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.conn.as_mut()
    }

    /// Replaces the class's remote method set (name → arity).
    ///
    /// Idempotent: returns `false` and writes nothing when the stored set
    /// already matches.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn register_methods(&mut self, methods: &BTreeMap<String, String>) -> StoreResult<bool> {
        let key = self.keys.methods();
        replace_hash(self.conn.as_mut(), &key, methods)
    }

    /// Reads the class's remote method set.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn registered_methods(&mut self) -> StoreResult<BTreeMap<String, String>> {
        let key = self.keys.methods();
        self.conn.hgetall(&key)
    }

    /// Replaces the class's remote attribute set (name → access spec).
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn register_attributes(
        &mut self,
        attributes: &BTreeMap<String, String>,
    ) -> StoreResult<bool> {
        let key = self.keys.attributes();
        replace_hash(self.conn.as_mut(), &key, attributes)
    }

    /// Reads the class's remote attribute set.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn registered_attributes(&mut self) -> StoreResult<BTreeMap<String, String>> {
        let key = self.keys.attributes();
        self.conn.hgetall(&key)
    }
}

fn replace_hash(
    conn: &mut dyn Connection,
    key: &str,
    desired: &BTreeMap<String, String>,
) -> StoreResult<bool> {
    transaction(conn, &[key.to_string()], |conn| {
        let current = conn.hgetall(key)?;
        let ops = replace_hash_ops(key, &current, desired);
        let changed = !ops.is_empty();
        Ok(Transaction::commit_if_any(ops, changed))
    })
}
