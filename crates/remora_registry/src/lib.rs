//! Registration and discovery bookkeeping for remora resources.
//!
//! Each resource class keeps, in the coordination store, its remote method
//! set, its remote attribute set and an instance registry mapping instance
//! name → live dispatcher count. A name with count 0 is known but not
//! callable. [`Registry`] maintains all three with optimistic transactions
//! and announces changes as [`RegistryEvent`]s on the class's channel.

pub mod error;
pub mod event;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use event::{EventKind, RegistryEvent};
pub use registry::{Registration, Registry};
