//! Pending results of asynchronous calls.

use crate::call::{Phase, abandon, consume};
use crate::error::{RpcError, RpcResult};
use remora_resource::{RemoteError, Value};
use remora_store::{Connection, ResourceIdentity, Store};
use std::time::Duration;

/// The result of a call submitted with `method?`.
///
/// [`value`](Self::value) blocks for the result and memoizes it, so later
/// calls return the same outcome without touching the store. A future that
/// is dropped or [abandoned](Self::abandon) before its result is consumed
/// cleans up its token.
pub struct RemoteFuture {
    store: Store,
    conn: Option<Box<dyn Connection>>,
    origin: ResourceIdentity,
    token: String,
    method: String,
    outcome: Option<Result<Value, RemoteError>>,
    released: bool,
}

impl core::fmt::Debug for RemoteFuture {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteFuture")
            .field("origin", &self.origin)
            .field("token", &self.token)
            .field("method", &self.method)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

impl RemoteFuture {
    pub(crate) fn new(
        store: &Store,
        origin: ResourceIdentity,
        token: String,
        method: impl Into<String>,
    ) -> Self {
        Self {
            store: store.clone(),
            conn: None,
            origin,
            token,
            method: method.into(),
            outcome: None,
            released: false,
        }
    }

    /// Token id the future waits on.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    fn connection(&mut self) -> RpcResult<&mut dyn Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.store.connect()?,
        };
        Ok(self.conn.insert(conn).as_mut())
    }

    /// Returns `true` once the result is available. Never blocks and never
    /// consumes the result.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn done(&mut self) -> RpcResult<bool> {
        if self.outcome.is_some() {
            return Ok(true);
        }
        let key = self.origin.keys().result(&self.token);
        Ok(self.connection()?.llen(&key)? > 0)
    }

    /// Waits up to `timeout` ([`Duration::ZERO`] waits forever) for the
    /// result.
    ///
    /// On timeout the token is kept, so `value` may be called again.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] if the remote method failed,
    /// [`RpcError::Timeout`] if no result arrived in time, or a store error.
    pub fn value(&mut self, timeout: Duration) -> RpcResult<Value> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone().map_err(RpcError::Remote);
        }
        let (origin, token) = (self.origin.clone(), self.token.clone());
        let Some(outcome) = consume(self.connection()?, &origin, &token, timeout)? else {
            return Err(RpcError::Timeout {
                resource: origin,
                method: self.method.clone(),
                timeout,
            });
        };
        self.outcome.insert(outcome).clone().map_err(RpcError::Remote)
    }

    /// Gives up on the result and cleans up the token.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn abandon(mut self) -> RpcResult<Phase> {
        self.release()
    }

    fn release(&mut self) -> RpcResult<Phase> {
        if self.outcome.is_some() || self.released {
            return Ok(Phase::Gone);
        }
        self.released = true;
        let (origin, token) = (self.origin.clone(), self.token.clone());
        abandon(self.connection()?, &origin, &token)
    }
}

impl Drop for RemoteFuture {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            tracing::warn!(resource = %self.origin, token = %self.token, error = %err, "failed to abandon token");
        }
    }
}
