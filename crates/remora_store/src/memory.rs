//! In-process coordination store.
//!
//! Implements the full [`Connection`] contract (watch/exec conflict
//! detection, blocking list moves, pub/sub fan-out and key expiry) over a
//! shared map guarded by a single lock. Connections obtained from the same
//! [`MemoryBackend`] see one another's writes exactly as Redis clients
//! sharing a server would.
//!
//! ```
//! use remora_store::Store;
//!
//! let store = Store::memory();
//! let mut conn = store.connect().unwrap();
//! conn.set("greeting", "hello", None).unwrap();
//! assert_eq!(conn.get("greeting").unwrap().as_deref(), Some("hello"));
//! ```

use crate::connection::{Backend, Connection, Message, WriteOp};
use crate::error::{StoreError, StoreResult};
use core::ops::ControlFlow;
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Backend holding all data in process memory.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl core::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("MemoryBackend")
            .field("keys", &state.entries.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn connect(&self) -> StoreResult<Box<dyn Connection>> {
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            watched: Vec::new(),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    /// Signalled whenever a list gains an element.
    changed: Condvar,
}

#[derive(Debug)]
enum Data {
    Text(String),
    Hash(BTreeMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Debug)]
struct Entry {
    data: Data,
    expires_at: Option<Instant>,
}

struct Subscriber {
    id: u64,
    channels: HashSet<String>,
    sender: mpsc::Sender<Message>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// Last modification stamp per key; survives deletion so watchers notice it.
    versions: HashMap<String, u64>,
    clock: u64,
    subscribers: Vec<Subscriber>,
    next_subscriber: u64,
}

impl State {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions.insert(key.to_string(), self.clock);
    }

    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn expire(&mut self, key: &str) {
        let expired = self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
            self.touch(key);
        }
    }

    fn expire_all(&mut self) {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            self.entries.remove(&key);
            self.touch(&key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.expire(key);
        self.entries.get_mut(key)
    }

    fn text(&mut self, key: &str) -> StoreResult<Option<String>> {
        match self.live(key).map(|entry| &entry.data) {
            None => Ok(None),
            Some(Data::Text(value)) => Ok(Some(value.clone())),
            Some(_) => Err(StoreError::command(WRONG_TYPE)),
        }
    }

    fn hash(&mut self, key: &str) -> StoreResult<Option<&mut BTreeMap<String, String>>> {
        match self.live(key).map(|entry| &mut entry.data) {
            None => Ok(None),
            Some(Data::Hash(map)) => Ok(Some(map)),
            Some(_) => Err(StoreError::command(WRONG_TYPE)),
        }
    }

    fn list(&mut self, key: &str) -> StoreResult<Option<&mut VecDeque<String>>> {
        match self.live(key).map(|entry| &mut entry.data) {
            None => Ok(None),
            Some(Data::List(list)) => Ok(Some(list)),
            Some(_) => Err(StoreError::command(WRONG_TYPE)),
        }
    }

    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                data: Data::Text(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        self.touch(key);
        Ok(())
    }

    fn del(&mut self, key: &str) -> bool {
        self.expire(key);
        let existed = self.entries.remove(key).is_some();
        if existed {
            self.touch(key);
        }
        existed
    }

    fn hset(&mut self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        if let Some(map) = self.hash(key)? {
            map.insert(field.to_string(), value.to_string());
        } else {
            let map = BTreeMap::from([(field.to_string(), value.to_string())]);
            self.entries.insert(
                key.to_string(),
                Entry {
                    data: Data::Hash(map),
                    expires_at: None,
                },
            );
        }
        self.touch(key);
        Ok(())
    }

    fn hdel(&mut self, key: &str, field: &str) -> StoreResult<bool> {
        let (removed, now_empty) = match self.hash(key)? {
            Some(map) => (map.remove(field).is_some(), map.is_empty()),
            None => return Ok(false),
        };
        if now_empty {
            self.entries.remove(key);
        }
        if removed {
            self.touch(key);
        }
        Ok(removed)
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let current = match self.hash(key)? {
            Some(map) => map.get(field).cloned(),
            None => None,
        };
        let current = match current {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::command("ERR hash value is not an integer"))?,
            None => 0,
        };
        let next = current + delta;
        self.hset(key, field, &next.to_string())?;
        Ok(next)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let len = if let Some(list) = self.list(key)? {
            list.push_back(value.to_string());
            list.len()
        } else {
            self.entries.insert(
                key.to_string(),
                Entry {
                    data: Data::List(VecDeque::from([value.to_string()])),
                    expires_at: None,
                },
            );
            1
        };
        self.touch(key);
        Ok(len as u64)
    }

    fn lpop(&mut self, key: &str) -> StoreResult<Option<String>> {
        let (value, now_empty) = match self.list(key)? {
            Some(list) => (list.pop_front(), list.is_empty()),
            None => return Ok(None),
        };
        if now_empty {
            self.entries.remove(key);
        }
        if value.is_some() {
            self.touch(key);
        }
        Ok(value)
    }

    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let (removed, now_empty) = match self.list(key)? {
            Some(list) => {
                let before = list.len();
                list.retain(|item| item != value);
                (before - list.len(), list.is_empty())
            }
            None => return Ok(0),
        };
        if now_empty {
            self.entries.remove(key);
        }
        if removed > 0 {
            self.touch(key);
        }
        Ok(removed as u64)
    }

    fn publish(&mut self, channel: &str, message: &str) -> u64 {
        let mut delivered = 0;
        self.subscribers.retain(|sub| {
            if !sub.channels.contains(channel) {
                return true;
            }
            let sent = sub
                .sender
                .send(Message {
                    channel: channel.to_string(),
                    payload: message.to_string(),
                })
                .is_ok();
            if sent {
                delivered += 1;
            }
            sent
        });
        delivered
    }

    fn apply(&mut self, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::Set { key, value, ttl } => self.set(key, value, *ttl)?,
            WriteOp::Del { key } => {
                self.del(key);
            }
            WriteOp::HSet { key, field, value } => self.hset(key, field, value)?,
            WriteOp::HDel { key, field } => {
                self.hdel(key, field)?;
            }
            WriteOp::HIncrBy { key, field, delta } => {
                self.hincrby(key, field, *delta)?;
            }
            WriteOp::RPush { key, value } => {
                self.rpush(key, value)?;
            }
            WriteOp::LRem { key, value } => {
                self.lrem(key, value)?;
            }
            WriteOp::Publish { channel, message } => {
                self.publish(channel, message);
            }
        }
        Ok(())
    }
}

/// Connection to a [`MemoryBackend`].
pub struct MemoryConnection {
    shared: Arc<Shared>,
    watched: Vec<(String, u64)>,
}

impl MemoryConnection {
    /// Waits on the shared condition until `deadline`; `None` waits forever.
    /// Returns `false` once the deadline has passed.
    fn wait(
        shared: &Shared,
        state: &mut parking_lot::MutexGuard<'_, State>,
        deadline: Option<Instant>,
    ) -> bool {
        match deadline {
            None => {
                shared.changed.wait(state);
                true
            }
            Some(deadline) => {
                if Instant::now() >= deadline {
                    return false;
                }
                let _ = shared.changed.wait_until(state, deadline);
                true
            }
        }
    }
}

fn deadline(timeout: Duration) -> Option<Instant> {
    if timeout.is_zero() {
        None
    } else {
        Some(Instant::now() + timeout)
    }
}

impl Connection for MemoryConnection {
    fn get(&mut self, key: &str) -> StoreResult<Option<String>> {
        self.shared.state.lock().text(key)
    }

    fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.shared.state.lock().set(key, value, ttl)
    }

    fn set_nx(&mut self, key: &str, value: &str) -> StoreResult<bool> {
        let mut state = self.shared.state.lock();
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.set(key, value, None)?;
        Ok(true)
    }

    fn del(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.shared.state.lock().del(key))
    }

    fn exists(&mut self, key: &str) -> StoreResult<bool> {
        Ok(self.shared.state.lock().live(key).is_some())
    }

    fn hget(&mut self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut state = self.shared.state.lock();
        Ok(state.hash(key)?.and_then(|map| map.get(field).cloned()))
    }

    fn hgetall(&mut self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut state = self.shared.state.lock();
        Ok(state.hash(key)?.map(|map| map.clone()).unwrap_or_default())
    }

    fn hincrby(&mut self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        self.shared.state.lock().hincrby(key, field, delta)
    }

    fn rpush(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        let len = self.shared.state.lock().rpush(key, value)?;
        self.shared.changed.notify_all();
        Ok(len)
    }

    fn lrem(&mut self, key: &str, value: &str) -> StoreResult<u64> {
        self.shared.state.lock().lrem(key, value)
    }

    fn llen(&mut self, key: &str) -> StoreResult<u64> {
        let mut state = self.shared.state.lock();
        Ok(state.list(key)?.map_or(0, |list| list.len() as u64))
    }

    fn lrange(&mut self, key: &str) -> StoreResult<Vec<String>> {
        let mut state = self.shared.state.lock();
        Ok(state
            .list(key)?
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn blmove(
        &mut self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> StoreResult<Option<String>> {
        let deadline = deadline(timeout);
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = state.lpop(source)? {
                state.rpush(destination, &value)?;
                drop(state);
                self.shared.changed.notify_all();
                return Ok(Some(value));
            }
            if !Self::wait(&self.shared, &mut state, deadline) {
                return Ok(None);
            }
        }
    }

    fn blpop(&mut self, key: &str, timeout: Duration) -> StoreResult<Option<String>> {
        let deadline = deadline(timeout);
        let mut state = self.shared.state.lock();
        loop {
            if let Some(value) = state.lpop(key)? {
                return Ok(Some(value));
            }
            if !Self::wait(&self.shared, &mut state, deadline) {
                return Ok(None);
            }
        }
    }

    fn publish(&mut self, channel: &str, message: &str) -> StoreResult<u64> {
        Ok(self.shared.state.lock().publish(channel, message))
    }

    fn watch(&mut self, keys: &[String]) -> StoreResult<()> {
        let mut state = self.shared.state.lock();
        for key in keys {
            state.expire(key);
            self.watched.push((key.clone(), state.version(key)));
        }
        Ok(())
    }

    fn unwatch(&mut self) -> StoreResult<()> {
        self.watched.clear();
        Ok(())
    }

    fn exec(&mut self, ops: &[WriteOp]) -> StoreResult<bool> {
        let watched = core::mem::take(&mut self.watched);
        let mut state = self.shared.state.lock();
        for (key, version) in &watched {
            state.expire(key);
            if state.version(key) != *version {
                return Ok(false);
            }
        }
        for op in ops {
            state.apply(op)?;
        }
        drop(state);
        self.shared.changed.notify_all();
        Ok(true)
    }

    fn listen(
        &mut self,
        channels: &[String],
        ready: &mut dyn FnMut(),
        handler: &mut dyn FnMut(Message) -> ControlFlow<()>,
    ) -> StoreResult<()> {
        let (sender, receiver) = mpsc::channel();
        let id = {
            let mut state = self.shared.state.lock();
            state.next_subscriber += 1;
            let id = state.next_subscriber;
            state.subscribers.push(Subscriber {
                id,
                channels: channels.iter().cloned().collect(),
                sender,
            });
            id
        };
        ready();

        let result = loop {
            match receiver.recv() {
                Ok(message) => {
                    if handler(message).is_break() {
                        break Ok(());
                    }
                }
                Err(_) => break Err(StoreError::connection("subscription closed")),
            }
        };

        self.shared
            .state
            .lock()
            .subscribers
            .retain(|sub| sub.id != id);
        result
    }

    fn key_count(&mut self) -> StoreResult<u64> {
        let mut state = self.shared.state.lock();
        state.expire_all();
        Ok(state.entries.len() as u64)
    }
}
