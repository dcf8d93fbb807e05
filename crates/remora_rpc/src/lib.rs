//! Remote calls for remora resources.
//!
//! A call is a token: the caller writes an [`Envelope`] under a fresh token
//! id and queues the id on the target's pending list; the target's
//! [`Dispatcher`] claims it, runs the method and pushes the outcome onto the
//! token's result slot, which the caller pops.
//!
//! - [`Dispatcher`]: serves one resource instance on a worker thread
//! - [`Proxy`]: calls methods and accesses attributes of one instance
//! - [`RemoteFuture`]: the result of an asynchronous call
//! - [`Route`]: a multi-hop call whose hops feed each other
//! - [`Discovery`]: finds live instances of a class
//!
//! ```
//! use remora_resource::resource;
//! use remora_rpc::{Discovery, Dispatcher};
//! use remora_store::Store;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Adder;
//!
//! #[resource(class = "Adder")]
//! impl Adder {
//!     #[remote]
//!     pub fn add(&self, a: i64, b: i64) -> i64 {
//!         a + b
//!     }
//! }
//!
//! let store = Store::memory();
//! let mut dispatcher = Dispatcher::new(&store, Arc::new(Adder))?;
//! dispatcher.start()?;
//!
//! let adder = Discovery::new(&store).any("Adder")?.expect("a live adder");
//! assert_eq!(adder.call("add", vec![json!(2), json!(3)])?, json!(5));
//!
//! dispatcher.stop()?;
//! # Ok::<(), remora_rpc::RpcError>(())
//! ```

pub mod call;
pub mod discovery;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod future;
pub mod proxy;

pub use call::Phase;
pub use discovery::Discovery;
pub use dispatcher::Dispatcher;
pub use envelope::{EXIT, Envelope, Hop, Origin, submit};
pub use error::{RpcError, RpcResult};
pub use future::RemoteFuture;
pub use proxy::{
    Capabilities, Capability, CallMode, MemberAccess, Proxy, ProxyOptions, Reply, Route,
};
