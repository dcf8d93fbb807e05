//! The primitive operations every coordination store must provide.
//!
//! A [`Backend`] hands out independent [`Connection`]s. Blocking calls
//! (`blmove`, `blpop`, `listen`) occupy their connection until they return,
//! so every worker and every caller-side blocking operation owns its own.
//!
//! Timeouts follow the store convention: [`Duration::ZERO`] waits forever.

use crate::error::StoreResult;
use core::ops::ControlFlow;
use std::collections::BTreeMap;
use std::time::Duration;

/// A single write queued inside an optimistic transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// `SET key value [PX ttl]`
    Set {
        /// Key to write.
        key: String,
        /// New value.
        value: String,
        /// Optional expiry.
        ttl: Option<Duration>,
    },
    /// `DEL key`
    Del {
        /// Key to delete.
        key: String,
    },
    /// `HSET key field value`
    HSet {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Field value.
        value: String,
    },
    /// `HDEL key field`
    HDel {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
    },
    /// `HINCRBY key field delta`
    HIncrBy {
        /// Hash key.
        key: String,
        /// Field name.
        field: String,
        /// Signed increment.
        delta: i64,
    },
    /// `RPUSH key value`
    RPush {
        /// List key.
        key: String,
        /// Value appended at the tail.
        value: String,
    },
    /// `LREM key 0 value`
    LRem {
        /// List key.
        key: String,
        /// Value to remove (all occurrences).
        value: String,
    },
    /// `PUBLISH channel message`
    Publish {
        /// Channel name.
        channel: String,
        /// Message payload.
        message: String,
    },
}

impl WriteOp {
    /// `SET` without expiry.
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl: None,
        }
    }

    /// `SET` with an optional expiry.
    pub fn set_with_ttl(
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        Self::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        }
    }

    /// `DEL`
    pub fn del(key: impl Into<String>) -> Self {
        Self::Del { key: key.into() }
    }

    /// `HSET`
    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    /// `HDEL`
    pub fn hdel(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self::HDel {
            key: key.into(),
            field: field.into(),
        }
    }

    /// `HINCRBY`
    pub fn hincrby(key: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Self::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        }
    }

    /// `RPUSH`
    pub fn rpush(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::RPush {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `LREM`
    pub fn lrem(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::LRem {
            key: key.into(),
            value: value.into(),
        }
    }

    /// `PUBLISH`
    pub fn publish(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            channel: channel.into(),
            message: message.into(),
        }
    }
}

/// A message received on a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message arrived on.
    pub channel: String,
    /// Raw payload.
    pub payload: String,
}

/// One connection to the coordination store.
pub trait Connection: Send {
    /// `GET`
    fn get(&mut self, key: &str) -> StoreResult<Option<String>>;

    /// `SET`, with an optional expiry.
    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// `SET NX`: writes only if the key is absent. Returns whether it wrote.
    fn set_nx(&mut self, key: &str, value: &str) -> StoreResult<bool>;

    /// `DEL`: returns whether the key existed.
    fn del(&mut self, key: &str) -> StoreResult<bool>;

    /// `EXISTS`
    fn exists(&mut self, key: &str) -> StoreResult<bool>;

    /// `HGET`
    fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// `HGETALL`
    fn hgetall(&mut self, key: &str) -> StoreResult<BTreeMap<String, String>>;

    /// `HINCRBY`: returns the new value.
    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// `RPUSH`: returns the new length.
    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64>;

    /// `LREM key 0 value`: returns how many entries were removed.
    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<u64>;

    /// `LLEN`
    fn llen(&mut self, key: &str) -> StoreResult<u64>;

    /// `LRANGE key 0 -1`
    fn lrange(&mut self, key: &str) -> StoreResult<Vec<String>>;

    /// `BLMOVE source destination LEFT RIGHT timeout`: atomically pops the
    /// head of `source` and appends it to `destination`, blocking until an
    /// element is available. Returns `None` on timeout.
    fn blmove(
        &mut self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>>;

    /// `BLPOP key timeout`: returns `None` on timeout.
    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>>;

    /// `PUBLISH`: returns the number of receivers.
    fn publish(&mut self, channel: &str, message: &str) -> StoreResult<u64>;

    /// `WATCH`: guards the next [`exec`](Self::exec) on this connection.
    fn watch(&mut self, keys: &[String]) -> StoreResult<()>;

    /// `UNWATCH`
    fn unwatch(&mut self) -> StoreResult<()>;

    /// `MULTI` + ops + `EXEC`.
    ///
    /// Returns `false` (and applies nothing) if any watched key changed
    /// since [`watch`](Self::watch). Clears the watch either way.
    fn exec(&mut self, ops: &[WriteOp]) -> StoreResult<bool>;

    /// `SUBSCRIBE` to `channels` and deliver messages to `handler` until it
    /// returns [`ControlFlow::Break`]. `ready` runs once the subscription is
    /// active.
    fn listen(
        &mut self,
        channels: &[String],
        ready: &mut dyn FnMut(),
        handler: &mut dyn FnMut(Message) -> ControlFlow<()>,
    ) -> StoreResult<()>;

    /// `DBSIZE`
    fn key_count(&mut self) -> StoreResult<u64>;
}

/// Source of store connections.
pub trait Backend: Send + Sync + 'static {
    /// Opens a new, independent connection.
    fn connect(&self) -> StoreResult<Box<dyn Connection>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
