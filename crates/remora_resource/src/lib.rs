//! Resource declaration layer for remora.
//!
//! A resource type declares, once, which of its methods and attributes are
//! reachable from other processes. The declaration is an immutable
//! [`ResourceDescriptor`] shared by every instance; calls arrive through
//! [`RemoteResource::invoke`] as positional JSON arguments.
//!
//! # Declaring a resource
//!
//! ```
//! use remora_resource::{RemoteResource, resource};
//! use serde_json::json;
//!
//! struct Calculator {
//!     region: String,
//! }
//!
//! #[resource(class = "Demo::Calculator", name = "region", accessor(precision))]
//! impl Calculator {
//!     #[remote]
//!     pub fn add(&self, a: i64, b: i64) -> i64 {
//!         a + b
//!     }
//!
//!     #[remote(variadic)]
//!     pub fn sum(&self, values: Vec<i64>) -> i64 {
//!         values.iter().sum()
//!     }
//!
//!     #[local_attribute]
//!     pub fn region(&self) -> String {
//!         self.region.clone()
//!     }
//! }
//!
//! let calc = Calculator { region: "eu".into() };
//! assert_eq!(calc.invoke("add", vec![json!(2), json!(3)]).unwrap(), json!(5));
//! assert_eq!(calc.descriptor().name_attribute(), Some("region"));
//! ```
//!
//! Errors returned by remote methods cross the process boundary as
//! [`RemoteError`]; types implementing [`RemoteException`] can be rebuilt
//! on the calling side.

extern crate self as remora_resource;

pub mod args;
pub mod descriptor;
pub mod error;
pub mod name;
pub mod resource;

pub use args::{Arguments, into_value};
pub use descriptor::{Access, Arity, AttributeSpec, DescriptorBuilder, ResourceDescriptor};
pub use error::{
    IntoRemoteError, REMOTE_HOP_MARKER, RemoteError, RemoteException, ResourceError, kinds,
};
pub use name::{NameGuard, resolve_name};
pub use resource::{RemoteResource, invoke_checked};
pub use resource_macros::resource;

/// Structured value carried by arguments, results and attributes.
pub use serde_json::Value;
