//! Remotely discoverable, remotely callable resources over a shared
//! coordination store.
//!
//! A resource is an ordinary Rust type whose impl block is marked with
//! `#[resource]`. A [`Dispatcher`](prelude::Dispatcher) registers it and
//! serves its remote methods; any process sharing the store can find it with
//! [`Discovery`](prelude::Discovery) and call it through a
//! [`Proxy`](prelude::Proxy).
//!
//! ```
//! use remora::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! struct Greeter {
//!     lang: String,
//! }
//!
//! #[resource(class = "Demo::Greeter", name = "lang")]
//! impl Greeter {
//!     #[remote]
//!     pub fn greet(&self, who: String) -> String {
//!         match self.lang.as_str() {
//!             "fr" => format!("bonjour {who}"),
//!             _ => format!("hello {who}"),
//!         }
//!     }
//!
//!     #[local_attribute]
//!     pub fn lang(&self) -> String {
//!         self.lang.clone()
//!     }
//! }
//!
//! let store = Store::memory();
//! let mut dispatcher = Dispatcher::new(&store, Arc::new(Greeter { lang: "fr".into() }))?;
//! dispatcher.start()?;
//!
//! let greeter = Discovery::new(&store).find("Demo::Greeter", "fr")?.expect("live");
//! assert_eq!(greeter.call("greet", vec![json!("monde")])?, json!("bonjour monde"));
//! # Ok::<(), RpcError>(())
//! ```

pub use remora_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use remora_internal::prelude::*;
}
