//! The dispatcher: one worker thread serving a resource's pending tokens.
//!
//! Each pass claims a token with a blocking move from `pending` to
//! `in_progress`, executes the head hop against the resource, and then
//! either forwards the result to the next hop or delivers it to the origin
//! token's result slot. Delivery is guarded by a watch on the origin's
//! detail record and clears the in-progress marker in the same commit.

use crate::envelope::{EXIT, Envelope, Origin, encode_outcome, reserve};
use crate::error::{RpcError, RpcResult};
use remora_registry::Registry;
use remora_resource::{RemoteError, RemoteResource, Value, invoke_checked};
use remora_store::{
    Connection, Keys, ResourceIdentity, Store, StoreResult, Transaction, WriteOp, transaction,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Serves remote calls for one resource instance.
///
/// A started dispatcher has registered its resource, bumped the live count
/// and runs a worker thread until [`stop`](Self::stop). Dropping a running
/// dispatcher stops it.
pub struct Dispatcher {
    store: Store,
    registry: Registry,
    identity: ResourceIdentity,
    resource: Arc<dyn RemoteResource>,
    worker_name: String,
    stopping: Arc<AtomicBool>,
    worker: Option<JoinHandle<StoreResult<()>>>,
}

impl core::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("identity", &self.identity)
            .field("worker_name", &self.worker_name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher for `resource`, not yet started.
    ///
    /// # Errors
    ///
    /// Returns a name error if the resource's identity cannot be resolved.
    pub fn new(store: &Store, resource: Arc<dyn RemoteResource>) -> RpcResult<Self> {
        let identity = remora_attributes::identity_of(resource.as_ref())?;
        Ok(Self {
            store: store.clone(),
            registry: Registry::new(store),
            worker_name: format!("remora-dispatch-{identity}"),
            identity,
            resource,
            stopping: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    /// Identity the dispatcher serves.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Name of the worker thread, for supervisors.
    #[must_use]
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Returns `true` while the worker thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Registers the resource, marks the instance live and starts serving.
    ///
    /// # Errors
    ///
    /// Returns a dispatcher error if already started, the start hook's
    /// error as [`RpcError::Remote`], or a registry, store or thread error.
    pub fn start(&mut self) -> RpcResult<()> {
        if self.worker.is_some() {
            return Err(RpcError::dispatcher(format!("{} is already started", self.identity)));
        }
        self.registry.register(self.resource.as_ref())?;
        let conn = self.store.connect()?;
        self.registry.start_instance(&self.identity)?;
        if let Err(err) = self.resource.on_resource_start() {
            tracing::warn!(resource = %self.identity, error = %err, "start hook failed; not serving");
            self.registry.stop_instance(&self.identity)?;
            return Err(RpcError::Remote(err));
        }
        self.stopping.store(false, Ordering::SeqCst);

        let worker = Worker {
            conn,
            keys: self.identity.keys(),
            identity: self.identity.clone(),
            resource: Arc::clone(&self.resource),
            stopping: Arc::clone(&self.stopping),
        };
        let spawned = std::thread::Builder::new()
            .name(self.worker_name.clone())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!(resource = %self.identity, "dispatcher started");
                Ok(())
            }
            Err(err) => {
                self.registry.stop_instance(&self.identity)?;
                self.run_stop_hook();
                Err(RpcError::dispatcher(format!("failed to spawn worker: {err}")))
            }
        }
    }

    /// Stops serving: pushes [`EXIT`], joins the worker, marks the instance
    /// no longer live.
    ///
    /// Tokens still pending stay queued for the next dispatcher. A no-op if
    /// not started.
    ///
    /// # Errors
    ///
    /// Returns a store or registry error, the error that ended the worker
    /// early, or a dispatcher error if the worker panicked.
    pub fn stop(&mut self) -> RpcResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        if !worker.is_finished() {
            self.stopping.store(true, Ordering::SeqCst);
            // The worker's own connection is blocked in the claim.
            self.store
                .connect()?
                .rpush(&self.identity.keys().pending(), EXIT)?;
        }
        let outcome = worker.join();

        self.registry.stop_instance(&self.identity)?;
        self.run_stop_hook();
        tracing::info!(resource = %self.identity, "dispatcher stopped");

        match outcome {
            Ok(result) => Ok(result?),
            Err(_) => Err(RpcError::dispatcher(format!("{} worker panicked", self.worker_name))),
        }
    }

    fn run_stop_hook(&self) {
        if let Err(err) = self.resource.on_resource_stop() {
            tracing::warn!(resource = %self.identity, error = %err, "stop hook failed");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(resource = %self.identity, error = %err, "dispatcher stopped with error");
        }
    }
}

struct Worker {
    conn: Box<dyn Connection>,
    keys: Keys,
    identity: ResourceIdentity,
    resource: Arc<dyn RemoteResource>,
    stopping: Arc<AtomicBool>,
}

enum Delivery {
    Delivered,
    Abandoned,
}

impl Worker {
    fn run(mut self) -> StoreResult<()> {
        let result = self.serve();
        if let Err(err) = &result {
            tracing::error!(resource = %self.identity, error = %err, "dispatcher loop failed");
        }
        result
    }

    fn serve(&mut self) -> StoreResult<()> {
        let (pending, in_progress) = (self.keys.pending(), self.keys.in_progress());
        loop {
            let Some(token) = self.conn.blmove(&pending, &in_progress, Duration::ZERO)? else {
                continue;
            };
            if token == EXIT {
                self.conn.lrem(&in_progress, EXIT)?;
                if self.stopping.load(Ordering::SeqCst) {
                    return Ok(());
                }
                // Meant for another dispatcher of the same instance.
                self.conn.rpush(&pending, EXIT)?;
                std::thread::yield_now();
                continue;
            }
            self.handle(&token)?;
        }
    }

    fn handle(&mut self, token: &str) -> StoreResult<()> {
        let detail = self.keys.token(token);
        let envelope = match self.conn.get(&detail)?.map(|raw| Envelope::decode(&raw)) {
            Some(Ok(envelope)) => envelope,
            Some(Err(err)) => {
                tracing::warn!(resource = %self.identity, token, error = %err, "dropping malformed token");
                return self.discard(token);
            }
            None => {
                tracing::warn!(resource = %self.identity, token, "dropping token without detail record");
                return self.discard(token);
            }
        };
        if envelope.abandoned {
            tracing::debug!(resource = %self.identity, token, "skipping abandoned token");
            return self.discard(token);
        }
        let Some(hop) = envelope.head() else {
            tracing::warn!(resource = %self.identity, token, "dropping token with empty path");
            return self.discard(token);
        };

        tracing::debug!(resource = %self.identity, token, method = %hop.method, "executing token");
        let outcome = invoke_checked(self.resource.as_ref(), &hop.method, hop.args.clone())
            .map_err(RemoteError::with_captured_frames);

        match outcome {
            Ok(value) if envelope.path.len() > 1 => self.forward(token, envelope, value),
            outcome => self.deliver(token, &envelope, &outcome),
        }
    }

    fn discard(&mut self, token: &str) -> StoreResult<()> {
        self.conn.exec(&[
            WriteOp::lrem(self.keys.in_progress(), token),
            WriteOp::del(self.keys.token(token)),
        ])?;
        Ok(())
    }

    fn origin(&self, envelope: &Envelope, token: &str) -> Origin {
        envelope.origin.clone().unwrap_or_else(|| Origin {
            resource: self.identity.clone(),
            token: token.to_string(),
        })
    }

    /// Ops that retire this token once its work is handed on.
    fn retire(&self, token: &str, origin: &Origin) -> Vec<WriteOp> {
        let mut ops = vec![WriteOp::lrem(self.keys.in_progress(), token)];
        if !origin.is(&self.identity, token) {
            ops.push(WriteOp::del(self.keys.token(token)));
        }
        ops
    }

    fn forward(&mut self, token: &str, envelope: Envelope, value: Value) -> StoreResult<()> {
        let origin = self.origin(&envelope, token);
        let mut path = envelope.path;
        path.remove(0);
        if let Some(next) = path.first_mut() {
            next.args.push(value);
        }
        let mut next = Envelope {
            token: String::new(),
            path,
            fire_and_forget: envelope.fire_and_forget,
            origin: Some(origin.clone()),
            abandoned: false,
        };

        // Queueing the next token and retiring this one commit together.
        match reserve(self.conn.as_mut(), &mut next) {
            Ok(pending) => {
                let mut ops = vec![WriteOp::rpush(pending, &next.token)];
                ops.extend(self.retire(token, &origin));
                self.conn.exec(&ops)?;
                tracing::debug!(resource = %self.identity, token, next = %next.token, "token forwarded");
                Ok(())
            }
            Err(RpcError::Store(err)) => Err(err),
            Err(err) => {
                let failure = Err(RemoteError::from_error(&err));
                self.deliver(token, &Envelope { origin: Some(origin), ..next }, &failure)
            }
        }
    }

    fn deliver(
        &mut self,
        token: &str,
        envelope: &Envelope,
        outcome: &Result<Value, RemoteError>,
    ) -> StoreResult<()> {
        let origin = self.origin(envelope, token);
        let origin_keys = origin.resource.keys();
        let origin_detail = origin_keys.token(&origin.token);
        let mut retire = self.retire(token, &origin);

        if envelope.fire_and_forget {
            if let Err(err) = outcome {
                tracing::warn!(resource = %self.identity, token, error = %err, "fire-and-forget call failed");
            }
            retire.push(WriteOp::del(&origin_detail));
            self.conn.exec(&retire)?;
            return Ok(());
        }

        let payload = encode_outcome(outcome);
        let delivery = transaction(
            self.conn.as_mut(),
            core::slice::from_ref(&origin_detail),
            |conn| {
                let mut ops = retire.clone();
                let abandoned = match conn.get(&origin_detail)? {
                    None => true,
                    Some(raw) => Envelope::decode(&raw).is_ok_and(|e| e.abandoned),
                };
                if abandoned {
                    ops.push(WriteOp::del(&origin_detail));
                    return Ok(Transaction::Commit(ops, Delivery::Abandoned));
                }
                ops.insert(0, WriteOp::rpush(origin_keys.result(&origin.token), &payload));
                Ok(Transaction::Commit(ops, Delivery::Delivered))
            },
        )?;

        match delivery {
            Delivery::Delivered => {
                tracing::debug!(resource = %self.identity, token, origin = %origin.token, "result published");
            }
            Delivery::Abandoned => {
                tracing::warn!(resource = %self.identity, token, "caller gave up; result discarded");
            }
        }
        Ok(())
    }
}
