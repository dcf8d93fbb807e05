//! Redis-backed coordination store.
//!
//! Uses synchronous `redis` connections: every blocking primitive parks the
//! calling thread on its own socket, which matches the one-connection-per-
//! worker ownership the protocol layers rely on. Commands are issued with
//! [`redis::cmd`] so the same code works across server versions that
//! support `BLMOVE` (6.2+).

use crate::config::StoreConfig;
use crate::connection::{Backend, Connection, Message, WriteOp};
use crate::error::{StoreError, StoreResult};
use core::ops::ControlFlow;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Backend connecting to a Redis-compatible server.
pub struct RedisBackend {
    client: redis::Client,
    connect_timeout: Option<Duration>,
}

impl core::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Creates a backend from connection settings. Does not connect yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the settings do not form a valid URL.
    pub fn new(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|err| StoreError::config(format!("invalid store settings: {err}")))?;
        Ok(Self {
            client,
            connect_timeout: config.timeout,
        })
    }
}

impl Backend for RedisBackend {
    fn connect(&self) -> StoreResult<Box<dyn Connection>> {
        let conn = match self.connect_timeout {
            Some(timeout) => self.client.get_connection_with_timeout(timeout)?,
            None => self.client.get_connection()?,
        };
        Ok(Box::new(RedisConnection { conn }))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// One synchronous Redis connection.
pub struct RedisConnection {
    conn: redis::Connection,
}

/// Blocking-command timeout in seconds; `0` blocks forever.
fn seconds(timeout: Duration) -> f64 {
    timeout.as_secs_f64()
}

fn millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by the server.
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn queue_op(pipe: &mut redis::Pipeline, op: &WriteOp) {
    match op {
        WriteOp::Set { key, value, ttl } => {
            let cmd = pipe.cmd("SET").arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(*ttl));
            }
            cmd.ignore();
        }
        WriteOp::Del { key } => {
            pipe.cmd("DEL").arg(key).ignore();
        }
        WriteOp::HSet { key, field, value } => {
            pipe.cmd("HSET").arg(key).arg(field).arg(value).ignore();
        }
        WriteOp::HDel { key, field } => {
            pipe.cmd("HDEL").arg(key).arg(field).ignore();
        }
        WriteOp::HIncrBy { key, field, delta } => {
            pipe.cmd("HINCRBY").arg(key).arg(field).arg(*delta).ignore();
        }
        WriteOp::RPush { key, value } => {
            pipe.cmd("RPUSH").arg(key).arg(value).ignore();
        }
        WriteOp::LRem { key, value } => {
            pipe.cmd("LREM").arg(key).arg(0).arg(value).ignore();
        }
        WriteOp::Publish { channel, message } => {
            pipe.cmd("PUBLISH").arg(channel).arg(message).ignore();
        }
    }
}

impl Connection for RedisConnection {
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        Ok(redis::cmd("GET").arg(key).query(&mut self.conn)?)
    }

    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        cmd.query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn set_nx(&mut self, key: &str, value: &str) -> StoreResult<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query(&mut self.conn)?;
        Ok(reply.is_some())
    }

    fn del(&mut self, key: &str) -> StoreResult<bool> {
        let removed: u64 = redis::cmd("DEL").arg(key).query(&mut self.conn)?;
        Ok(removed > 0)
    }

    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        let found: u64 = redis::cmd("EXISTS").arg(key).query(&mut self.conn)?;
        Ok(found > 0)
    }

    fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(redis::cmd("HGET").arg(key).arg(field).query(&mut self.conn)?)
    }

    fn hgetall(&mut self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let map: HashMap<String, String> = redis::cmd("HGETALL").arg(key).query(&mut self.conn)?;
        Ok(map.into_iter().collect())
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        Ok(redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query(&mut self.conn)?)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        Ok(redis::cmd("RPUSH").arg(key).arg(value).query(&mut self.conn)?)
    }

    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        Ok(redis::cmd("LREM")
            .arg(key)
            .arg(0)
            .arg(value)
            .query(&mut self.conn)?)
    }

    fn llen(&mut self, key: &str) -> StoreResult<u64> {
        Ok(redis::cmd("LLEN").arg(key).query(&mut self.conn)?)
    }

    fn lrange(&mut self, key: &str) -> StoreResult<Vec<String>> {
        Ok(redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query(&mut self.conn)?)
    }

    fn blmove(
        &mut self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        Ok(redis::cmd("BLMOVE")
            .arg(source)
            .arg(destination)
            .arg("LEFT")
            .arg("RIGHT")
            .arg(seconds(timeout))
            .query(&mut self.conn)?)
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(seconds(timeout))
            .query(&mut self.conn)?;
        Ok(popped.map(|(_, value)| value))
    }

    fn publish(&mut self, channel: &str, message: &str) -> StoreResult<u64> {
        Ok(redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query(&mut self.conn)?)
    }

    fn watch(&mut self, keys: &[String]) -> StoreResult<()> {
        redis::cmd("WATCH").arg(keys).query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn unwatch(&mut self) -> StoreResult<()> {
        redis::cmd("UNWATCH").query::<()>(&mut self.conn)?;
        Ok(())
    }

    fn exec(&mut self, ops: &[WriteOp]) -> StoreResult<bool> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            queue_op(&mut pipe, op);
        }
        // EXEC replies nil when a watched key changed.
        let reply: Option<redis::Value> = pipe.query(&mut self.conn)?;
        Ok(reply.is_some())
    }

    fn listen(
        &mut self,
        channels: &[String],
        ready: &mut dyn FnMut(),
        handler: &mut dyn FnMut(Message) -> ControlFlow<()>,
    ) -> StoreResult<()> {
        let mut pubsub = self.conn.as_pubsub();
        pubsub.subscribe(channels)?;
        ready();

        loop {
            let msg = pubsub.get_message()?;
            let message = Message {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload()?,
            };
            if handler(message).is_break() {
                // Dropping the pubsub handle unsubscribes and drains.
                return Ok(());
            }
        }
    }

    fn key_count(&mut self) -> StoreResult<u64> {
        Ok(redis::cmd("DBSIZE").query(&mut self.conn)?)
    }
}
