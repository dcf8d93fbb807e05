//! Attribute records of one resource instance.
//!
//! Each attribute is a JSON string at `<class>.<name>.attributes.<key>`.
//! Every write that changes the stored value publishes the new value on a
//! channel of the same name; writes that leave the value unchanged publish
//! nothing. A deleted or expired attribute reads as absent and is announced
//! as `null`.

use crate::error::{AttributeError, AttributeResult};
use remora_resource::{ResourceDescriptor, Value};
use remora_store::{
    Connection, Keys, ResourceIdentity, Store, StoreResult, Transaction, WriteOp, transaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Reads and writes the attributes of one resource instance.
///
/// Owns a dedicated store connection.
pub struct AttributeStore {
    identity: ResourceIdentity,
    keys: Keys,
    ttls: HashMap<String, Duration>,
    conn: Box<dyn Connection>,
}

impl core::fmt::Debug for AttributeStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttributeStore")
            .field("identity", &self.identity)
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

impl AttributeStore {
    /// Opens the attribute store of `identity`.
    ///
    /// # Errors
    ///
    /// Returns a store error if no connection can be opened.
    pub fn open(store: &Store, identity: ResourceIdentity) -> AttributeResult<Self> {
        Ok(Self {
            keys: identity.keys(),
            identity,
            ttls: HashMap::new(),
            conn: store.connect()?,
        })
    }

    /// Applies the expiry declared for each attribute of `descriptor`.
    #[must_use]
    pub fn with_descriptor(mut self, descriptor: &ResourceDescriptor) -> Self {
        for (name, spec) in descriptor.attributes() {
            if let Some(ttl) = spec.ttl {
                self.ttls.insert(name.clone(), ttl);
            }
        }
        self
    }

    /// Sets the expiry of one attribute.
    #[must_use]
    pub fn with_ttl(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ttls.insert(key.into(), ttl);
        self
    }

    /// The owning resource.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Store key and change channel of attribute `key`.
    #[must_use]
    pub fn channel(&self, key: &str) -> String {
        self.keys.attribute(key)
    }

    /// Reads an attribute as a raw value.
    ///
    /// # Errors
    ///
    /// Returns a store error, or a serialization error if the stored record
    /// is not valid JSON.
    pub fn get_value(&mut self, key: &str) -> AttributeResult<Option<Value>> {
        let raw = self.conn.get(&self.keys.attribute(key))?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Reads and decodes an attribute.
    ///
    /// # Errors
    ///
    /// Returns a store error, or a serialization error if the value does not
    /// decode as `T`.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> AttributeResult<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Writes an attribute. Returns `true` if the stored value changed.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> AttributeResult<bool> {
        let value = serde_json::to_value(value)?;
        self.write(key, value, false)
    }

    /// Writes an attribute only if it holds no value yet.
    ///
    /// Returns `true` if the value was written.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub fn set_if_absent<T: Serialize>(&mut self, key: &str, value: &T) -> AttributeResult<bool> {
        let value = serde_json::to_value(value)?;
        self.write(key, value, true)
    }

    /// Deletes an attribute. Returns `true` if it held a value.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn delete(&mut self, key: &str) -> AttributeResult<bool> {
        let record = self.keys.attribute(key);
        let removed = transaction(self.conn.as_mut(), &[record.clone()], |conn| {
            if !conn.exists(&record)? {
                return Ok(Transaction::Abort(false));
            }
            Ok(Transaction::Commit(
                vec![WriteOp::del(&record), WriteOp::publish(&record, "null")],
                true,
            ))
        })?;
        if removed {
            tracing::debug!(resource = %self.identity, key, "attribute deleted");
        }
        Ok(removed)
    }

    fn write(&mut self, key: &str, value: Value, only_if_absent: bool) -> AttributeResult<bool> {
        let record = self.keys.attribute(key);
        let encoded = serde_json::to_string(&value)?;
        let ttl = self.ttls.get(key).copied();

        let changed = transaction(self.conn.as_mut(), &[record.clone()], |conn| {
            let current = read(conn, &record)?;
            if only_if_absent && current.is_some() {
                return Ok(Transaction::Abort(false));
            }
            if current.as_ref() == Some(&value) {
                // Unchanged values are not rewritten, except to renew expiry.
                return Ok(match ttl {
                    Some(ttl) => Transaction::Commit(
                        vec![WriteOp::set_with_ttl(&record, &encoded, Some(ttl))],
                        false,
                    ),
                    None => Transaction::Abort(false),
                });
            }
            Ok(Transaction::Commit(
                vec![
                    WriteOp::set_with_ttl(&record, &encoded, ttl),
                    WriteOp::publish(&record, &encoded),
                ],
                true,
            ))
        })?;

        if changed {
            tracing::debug!(resource = %self.identity, key, "attribute changed");
        }
        Ok(changed)
    }

    /// Read-modify-write of one attribute under optimistic locking.
    ///
    /// `transform` receives the current value (or `None`) and returns the
    /// new one. If the attribute changes between the read and the write,
    /// the whole cycle runs again with the fresh value, so `transform` may
    /// be called more than once. Returns the value that was stored.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub fn modify<T, F>(&mut self, key: &str, mut transform: F) -> AttributeResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(Option<T>) -> T,
    {
        let mut values = self.modify_records(&[key], |mut current| {
            // Undecodable records are treated as absent.
            let decoded = current
                .pop()
                .flatten()
                .and_then(|value| serde_json::from_value::<T>(value).ok());
            Ok(vec![serde_json::to_value(transform(decoded))?])
        })?;
        let stored = values.pop().unwrap_or(Value::Null);
        Ok(serde_json::from_value(stored)?)
    }

    /// Read-modify-write of several attributes in one transaction.
    ///
    /// `transform` receives the current values in `keys` order and must
    /// return one new value per key. Only values that changed are written
    /// and published. Retries with fresh values on conflict.
    ///
    /// # Errors
    ///
    /// Returns [`AttributeError::ModifyArity`] if `transform` returns the
    /// wrong number of values, or a store or serialization error.
    pub fn modify_many<F>(
        &mut self,
        keys: &[&str],
        mut transform: F,
    ) -> AttributeResult<Vec<Value>>
    where
        F: FnMut(Vec<Option<Value>>) -> Vec<Value>,
    {
        self.modify_records(keys, |current| Ok(transform(current)))
    }

    /// A failing `transform` aborts the transaction without writing.
    fn modify_records<F>(
        &mut self,
        keys: &[&str],
        mut transform: F,
    ) -> AttributeResult<Vec<Value>>
    where
        F: FnMut(Vec<Option<Value>>) -> AttributeResult<Vec<Value>>,
    {
        let records: Vec<String> = keys.iter().map(|key| self.keys.attribute(key)).collect();
        let ttls: Vec<Option<Duration>> = keys
            .iter()
            .map(|key| self.ttls.get(*key).copied())
            .collect();

        transaction(self.conn.as_mut(), &records, |conn| {
            let mut current = Vec::with_capacity(records.len());
            for record in &records {
                current.push(read(conn, record)?);
            }

            let next = match transform(current.clone()) {
                Ok(next) => next,
                Err(err) => return Ok(Transaction::Abort(Err(err))),
            };
            if next.len() != records.len() {
                return Ok(Transaction::Abort(Err(AttributeError::ModifyArity {
                    expected: records.len(),
                    actual: next.len(),
                })));
            }

            let mut ops = Vec::new();
            let changes = records.iter().zip(&ttls).zip(current.iter().zip(&next));
            for ((record, ttl), (old, new)) in changes {
                if old.as_ref() == Some(new) {
                    continue;
                }
                let encoded = new.to_string();
                ops.push(WriteOp::set_with_ttl(record, &encoded, *ttl));
                ops.push(WriteOp::publish(record, &encoded));
            }
            Ok(Transaction::commit_if_any(ops, Ok(next)))
        })?
    }
}

fn read(conn: &mut dyn Connection, record: &str) -> StoreResult<Option<Value>> {
    // A record that is not JSON is overwritten like an absent one.
    Ok(conn
        .get(record)?
        .and_then(|raw| serde_json::from_str(&raw).ok()))
}
