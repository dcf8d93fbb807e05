//! Registration and live-instance bookkeeping.
//!
//! Registration is one optimistic transaction over the class's method set,
//! attribute set and instance registry plus the instance's params: read
//! the current state, write only what differs, retry on conflict. The
//! event is published inside the same transaction, so an unchanged
//! registration writes nothing and announces nothing.

use crate::error::RegistryResult;
use crate::event::{EventKind, RegistryEvent};
use remora_attributes::identity_of;
use remora_resource::{RemoteResource, Value};
use remora_store::{
    Connection, Keys, ResourceIdentity, Store, StoreResult, Transaction, WriteOp, replace_hash_ops,
    transaction,
};
use std::collections::BTreeMap;

/// Outcome of [`Registry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Identity the resource was registered under.
    pub identity: ResourceIdentity,
    /// Event published, or `None` when nothing changed.
    pub event: Option<EventKind>,
}

impl Registration {
    /// Returns `true` if the registration wrote anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Registers resources and tracks their live instance counts.
#[derive(Debug, Clone)]
pub struct Registry {
    store: Store,
}

impl Registry {
    /// Registry over `store`.
    #[must_use]
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
        }
    }

    /// Makes `resource` discoverable.
    ///
    /// Brings the class's method and attribute sets in line with the
    /// resource's descriptor, stores its params, and adds the instance name
    /// to the class registry with a live count of 0 if it is not there yet.
    /// Idempotent: a second call with unchanged capabilities performs no
    /// writes and publishes nothing.
    ///
    /// # Errors
    ///
    /// Returns a name error if the identity cannot be resolved, or a store
    /// error.
    pub fn register(&self, resource: &dyn RemoteResource) -> RegistryResult<Registration> {
        let identity = identity_of(resource)?;
        let descriptor = resource.descriptor();
        let methods = descriptor.method_table();
        let attributes = descriptor.attribute_table();
        let params = resource.params();

        let keys = identity.keys();
        let watched = [keys.methods(), keys.attributes(), keys.params(), keys.instances()];
        let mut conn = self.store.connect()?;

        let event = transaction(conn.as_mut(), &watched, |conn| {
            let mut ops = Vec::new();
            ops.extend(replace_hash_ops(
                &keys.methods(),
                &conn.hgetall(&keys.methods())?,
                &methods,
            ));
            ops.extend(replace_hash_ops(
                &keys.attributes(),
                &conn.hgetall(&keys.attributes())?,
                &attributes,
            ));
            if let Some(params) = &params {
                let current = conn
                    .get(&keys.params())?
                    .and_then(|raw| serde_json::from_str::<Value>(&raw).ok());
                if current.as_ref() != Some(params) {
                    ops.push(WriteOp::set(keys.params(), params.to_string()));
                }
            }

            let known = conn.hget(&keys.instances(), identity.name())?.is_some();
            if !known {
                ops.push(WriteOp::hset(keys.instances(), identity.name(), "0"));
            }

            let event = match (known, ops.is_empty()) {
                (false, _) => EventKind::Created,
                (true, false) => EventKind::Updated,
                (true, true) => return Ok(Transaction::Abort(None)),
            };
            ops.extend(publish(&identity, event));
            Ok(Transaction::Commit(ops, Some(event)))
        })?;

        match event {
            Some(event) => tracing::info!(resource = %identity, ?event, "resource registered"),
            None => tracing::debug!(resource = %identity, "registration unchanged"),
        }
        Ok(Registration { identity, event })
    }

    /// Removes `resource` from its class registry and drops its params.
    ///
    /// Returns `false` if it was not registered. The class's method and
    /// attribute sets and the instance's attributes are left alone.
    ///
    /// # Errors
    ///
    /// Returns a name error if the identity cannot be resolved, or a store
    /// error.
    pub fn unregister(&self, resource: &dyn RemoteResource) -> RegistryResult<bool> {
        let identity = identity_of(resource)?;
        self.unregister_identity(&identity)
    }

    /// Removes an instance by identity. See [`unregister`](Self::unregister).
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn unregister_identity(&self, identity: &ResourceIdentity) -> RegistryResult<bool> {
        let keys = identity.keys();
        let mut conn = self.store.connect()?;

        let removed = transaction(conn.as_mut(), &[keys.instances(), keys.params()], |conn| {
            let known = conn.hget(&keys.instances(), identity.name())?.is_some();
            let has_params = conn.exists(&keys.params())?;
            if !known && !has_params {
                return Ok(Transaction::Abort(false));
            }
            let mut ops = vec![
                WriteOp::hdel(keys.instances(), identity.name()),
                WriteOp::del(keys.params()),
            ];
            ops.extend(publish(identity, EventKind::Removed));
            Ok(Transaction::Commit(ops, true))
        })?;

        if removed {
            tracing::info!(resource = %identity, "resource unregistered");
        }
        Ok(removed)
    }

    /// Records one more live dispatcher for `identity`. Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn start_instance(&self, identity: &ResourceIdentity) -> RegistryResult<u64> {
        let keys = identity.keys();
        let mut conn = self.store.connect()?;
        let count = transaction(conn.as_mut(), &[keys.instances()], |conn| {
            let next = live_count(conn, &keys, identity)? + 1;
            let mut ops = vec![WriteOp::hset(
                keys.instances(),
                identity.name(),
                next.to_string(),
            )];
            ops.extend(publish(identity, EventKind::Started));
            Ok(Transaction::Commit(ops, next))
        })?;
        tracing::debug!(resource = %identity, count, "instance started");
        Ok(count)
    }

    /// Records one fewer live dispatcher for `identity`. Returns the new
    /// count, which never drops below 0.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn stop_instance(&self, identity: &ResourceIdentity) -> RegistryResult<u64> {
        let keys = identity.keys();
        let mut conn = self.store.connect()?;
        let count = transaction(conn.as_mut(), &[keys.instances()], |conn| {
            let current = live_count(conn, &keys, identity)?;
            if current == 0 {
                return Ok(Transaction::Abort(None));
            }
            let next = current - 1;
            let mut ops = vec![WriteOp::hset(
                keys.instances(),
                identity.name(),
                next.to_string(),
            )];
            ops.extend(publish(identity, EventKind::Stopped));
            Ok(Transaction::Commit(ops, Some(next)))
        })?;

        match count {
            Some(count) => {
                tracing::debug!(resource = %identity, count, "instance stopped");
                Ok(count)
            }
            None => {
                tracing::warn!(resource = %identity, "stop_instance with no live instances");
                Ok(0)
            }
        }
    }

    /// Every known instance name of a namespaced class with its live count.
    ///
    /// A point-in-time snapshot.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn instances(&self, class: &str) -> RegistryResult<BTreeMap<String, u64>> {
        let raw = self.store.connect()?.hgetall(&Keys::for_class(class).instances())?;
        Ok(raw
            .into_iter()
            .map(|(name, count)| (name, count.parse().unwrap_or(0)))
            .collect())
    }

    /// Sorted names of the instances of a namespaced class with a live
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn live_instances(&self, class: &str) -> RegistryResult<Vec<String>> {
        Ok(self
            .instances(class)?
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, _)| name)
            .collect())
    }
}

fn live_count(
    conn: &mut dyn Connection,
    keys: &Keys,
    identity: &ResourceIdentity,
) -> StoreResult<u64> {
    Ok(conn
        .hget(&keys.instances(), identity.name())?
        .and_then(|raw| raw.parse::<i64>().ok())
        .map_or(0, |count| u64::try_from(count).unwrap_or(0)))
}

fn publish(identity: &ResourceIdentity, event: EventKind) -> Vec<WriteOp> {
    let payload = RegistryEvent::new(event, identity)
        .encode()
        .unwrap_or_default();
    RegistryEvent::channels(identity)
        .into_iter()
        .map(|channel| WriteOp::publish(channel, payload.as_str()))
        .collect()
}
