//! Registry events.
//!
//! Every event goes to the class channel, which carries the whole class,
//! and to the channel of the instance it concerns.

use remora_store::{Keys, ResourceIdentity};
use serde::{Deserialize, Serialize};

/// What happened to an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First registration of the instance.
    Created,
    /// Registration changed the class's capabilities or the instance params.
    Updated,
    /// A dispatcher started serving the instance.
    Started,
    /// A dispatcher serving the instance stopped.
    Stopped,
    /// The instance was unregistered.
    Removed,
}

/// One registry event, as published in JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// What happened.
    pub event: EventKind,
    /// The instance it happened to.
    pub resource: ResourceIdentity,
}

impl RegistryEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(event: EventKind, resource: &ResourceIdentity) -> Self {
        Self {
            event,
            resource: resource.clone(),
        }
    }

    /// Channel carrying events for `resource` only.
    #[must_use]
    pub fn channel(resource: &ResourceIdentity) -> String {
        resource.keys().instance_events()
    }

    /// Channels an event about `resource` is published on: the class
    /// channel, then the instance channel when it is a distinct one.
    #[must_use]
    pub fn channels(resource: &ResourceIdentity) -> Vec<String> {
        let keys = resource.keys();
        let mut channels = vec![keys.events()];
        if !resource.is_class_level() {
            channels.push(keys.instance_events());
        }
        channels
    }

    /// Channel carrying events for a namespaced class.
    #[must_use]
    pub fn class_channel(class: &str) -> String {
        Keys::for_class(class).events()
    }

    /// JSON encoding.
    ///
    /// # Errors
    ///
    /// Returns a serialization error (not expected for this type).
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a published event.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed payloads.
    pub fn decode(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }
}
