//! Remote attributes for remora resources.
//!
//! Attributes live in the coordination store under the owning resource's
//! identity and are written only by that resource's process. This crate
//! provides:
//!
//! - [`AttributeStore`]: get, set, set-if-absent, delete, and optimistic
//!   read-modify-write ([`AttributeStore::modify`]), publishing each real
//!   change on the attribute's channel
//! - [`SubscriberSession`] and [`Bindings`]: a dedicated thread that routes
//!   change messages to handlers
//! - [`identity_of`]: the store identity of a declared resource
//!
//! ```
//! use remora_attributes::AttributeStore;
//! use remora_store::{ResourceIdentity, Store};
//!
//! let store = Store::memory();
//! let mut attrs = AttributeStore::open(&store, ResourceIdentity::new("Counter", "main"))?;
//! attrs.set("value", &1)?;
//! let next = attrs.modify("value", |v: Option<i64>| v.unwrap_or(0) + 1)?;
//! assert_eq!(next, 2);
//! # Ok::<(), remora_attributes::AttributeError>(())
//! ```

pub mod error;
pub mod identity;
pub mod store;
pub mod subscriber;

pub use error::{AttributeError, AttributeResult};
pub use identity::identity_of;
pub use store::AttributeStore;
pub use subscriber::{Bindings, ChangeHandler, SubscriberSession};
