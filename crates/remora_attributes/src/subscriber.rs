//! Attribute change subscriptions.
//!
//! A [`SubscriberSession`] runs one thread holding one blocking
//! subscription over every bound attribute channel plus a private
//! unsubscribe channel. Stopping the session publishes on that private
//! channel from a second connection, since the listening connection is
//! blocked inside the subscription.

use crate::error::{AttributeError, AttributeResult};
use core::ops::ControlFlow;
use indexmap::IndexMap;
use remora_resource::Value;
use remora_store::{ResourceIdentity, Store, StoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Handler for attribute changes: receives the attribute key (without the
/// namespace prefix) and the new value, `null` once deleted.
pub type ChangeHandler = Box<dyn FnMut(&str, Value) + Send>;

struct Binding {
    key: String,
    handler: ChangeHandler,
}

/// Attribute → handler bindings, keyed by change channel.
#[derive(Default)]
pub struct Bindings {
    channels: IndexMap<String, Binding>,
}

impl core::fmt::Debug for Bindings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.channels.keys()).finish()
    }
}

impl Bindings {
    /// Empty binding set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes changes of attribute `key` on `resource` to `handler`.
    ///
    /// Binding the same attribute twice keeps the last handler.
    #[must_use]
    pub fn on(
        mut self,
        resource: &ResourceIdentity,
        key: &str,
        handler: impl FnMut(&str, Value) + Send + 'static,
    ) -> Self {
        self.channels.insert(
            resource.keys().attribute(key),
            Binding {
                key: key.to_string(),
                handler: Box::new(handler),
            },
        );
        self
    }

    /// Number of bound attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    fn dispatch(&mut self, channel: &str, payload: &str) {
        let Some(binding) = self.channels.get_mut(channel) else {
            return;
        };
        match serde_json::from_str(payload) {
            Ok(value) => (binding.handler)(&binding.key, value),
            Err(err) => {
                tracing::warn!(channel, error = %err, "dropping malformed attribute change");
            }
        }
    }
}

/// A running subscription thread.
///
/// Dropping a session stops it; use [`stop`](Self::stop) to observe errors.
pub struct SubscriberSession {
    store: Store,
    owner: ResourceIdentity,
    stop_channel: String,
    handle: Option<JoinHandle<StoreResult<()>>>,
}

impl core::fmt::Debug for SubscriberSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubscriberSession")
            .field("owner", &self.owner)
            .field("stop_channel", &self.stop_channel)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SubscriberSession {
    /// Subscribes `bindings` on a dedicated thread.
    ///
    /// `owner` roots the private unsubscribe channel. Returns once the
    /// subscription is active, so changes published afterwards are seen.
    ///
    /// # Errors
    ///
    /// Returns a store error if the connection or subscription fails, or a
    /// subscriber error if the thread cannot be spawned.
    pub fn start(
        store: &Store,
        owner: &ResourceIdentity,
        mut bindings: Bindings,
    ) -> AttributeResult<Self> {
        let session = format!(
            "{}-{}",
            std::process::id(),
            SESSION_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let stop_channel = owner.keys().unsubscribe(&session);
        let mut channels: Vec<String> = bindings.channels.keys().cloned().collect();
        channels.push(stop_channel.clone());

        let mut conn = store.connect()?;
        let (ready_tx, ready_rx) = mpsc::channel();
        let stop = stop_channel.clone();

        let handle = std::thread::Builder::new()
            .name(format!("remora-subscriber-{owner}"))
            .spawn(move || {
                tracing::info!(%session, channels = channels.len() - 1, "subscriber session started");
                let result = conn.listen(
                    &channels,
                    &mut || {
                        let _ = ready_tx.send(());
                    },
                    &mut |msg| {
                        if msg.channel == stop {
                            return ControlFlow::Break(());
                        }
                        bindings.dispatch(&msg.channel, &msg.payload);
                        ControlFlow::Continue(())
                    },
                );
                tracing::info!(%session, "subscriber session stopped");
                result
            })
            .map_err(|err| AttributeError::subscriber(format!("failed to spawn thread: {err}")))?;

        let mut session = Self {
            store: store.clone(),
            owner: owner.clone(),
            stop_channel,
            handle: Some(handle),
        };
        if ready_rx.recv().is_err() {
            // The thread ended before subscribing; surface why.
            session.join()?;
            return Err(AttributeError::subscriber("subscription ended before it was ready"));
        }
        Ok(session)
    }

    /// Returns `true` while the subscription thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Ends the subscription and waits for its thread.
    ///
    /// # Errors
    ///
    /// Returns a store error if the stop message cannot be published or the
    /// subscription failed, or a subscriber error if the thread panicked.
    pub fn stop(mut self) -> AttributeResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> AttributeResult<()> {
        if self.handle.is_none() {
            return Ok(());
        }
        if self.is_running() {
            self.store.connect()?.publish(&self.stop_channel, "")?;
        }
        self.join()
    }

    fn join(&mut self) -> AttributeResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(AttributeError::subscriber("subscriber thread panicked")),
        }
    }
}

impl Drop for SubscriberSession {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(owner = %self.owner, error = %err, "subscriber session ended with error");
        }
    }
}
