//! Finding live instances of a resource class.
//!
//! Every lookup is a point-in-time snapshot: an instance found here may
//! stop before it is called, which surfaces as an ordinary call failure or
//! timeout.

use crate::error::RpcResult;
use crate::proxy::{Capabilities, Proxy, ProxyOptions};
use rand::Rng;
use remora_registry::Registry;
use remora_store::{ResourceIdentity, Store, namespace};

/// Finder over the instance registry.
#[derive(Debug, Clone)]
pub struct Discovery {
    store: Store,
    registry: Registry,
    options: ProxyOptions,
}

impl Discovery {
    /// Finder over `store`.
    #[must_use]
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
            registry: Registry::new(store),
            options: ProxyOptions::default(),
        }
    }

    /// Options given to every proxy this finder returns.
    #[must_use]
    pub fn with_options(mut self, options: ProxyOptions) -> Self {
        self.options = options;
        self
    }

    /// Proxies for every live instance of the logical `class`, sorted by
    /// name.
    ///
    /// # Errors
    ///
    /// Returns a registry or store error.
    pub fn all(&self, class: &str) -> RpcResult<Vec<Proxy>> {
        let class = namespace(class);
        let names = self.registry.live_instances(&class)?;
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let capabilities = self.capabilities(&class)?;
        Ok(names
            .iter()
            .map(|name| self.proxy(ResourceIdentity::new(&class, name), capabilities.clone()))
            .collect())
    }

    /// The live instance of `class` called `name`.
    ///
    /// # Errors
    ///
    /// Returns a registry or store error.
    pub fn find(&self, class: &str, name: &str) -> RpcResult<Option<Proxy>> {
        let wanted = namespace(name);
        self.find_by(class, |proxy| proxy.name() == wanted)
    }

    /// The first live instance of `class`, in name order, matching
    /// `predicate`.
    ///
    /// # Errors
    ///
    /// Returns a registry or store error.
    pub fn find_by(
        &self,
        class: &str,
        predicate: impl FnMut(&Proxy) -> bool,
    ) -> RpcResult<Option<Proxy>> {
        Ok(self.all(class)?.into_iter().find(predicate))
    }

    /// A live instance of `class` picked uniformly at random.
    ///
    /// # Errors
    ///
    /// Returns a registry or store error.
    pub fn any(&self, class: &str) -> RpcResult<Option<Proxy>> {
        let mut all = self.all(class)?;
        if all.is_empty() {
            return Ok(None);
        }
        let pick = rand::rng().random_range(0..all.len());
        Ok(Some(all.swap_remove(pick)))
    }

    fn capabilities(&self, class: &str) -> RpcResult<Capabilities> {
        let mut conn = self.store.connect()?;
        Ok(Capabilities::load(
            conn.as_mut(),
            &ResourceIdentity::class_level(class),
        )?)
    }

    fn proxy(&self, identity: ResourceIdentity, capabilities: Capabilities) -> Proxy {
        tracing::trace!(resource = %identity, "instance discovered");
        Proxy::with_capabilities(&self.store, identity, capabilities).with_options(self.options)
    }
}
