//! Client-side handles on remote resources.
//!
//! A [`Proxy`] snapshots the target class's registered methods and
//! attributes when it is built. Member names follow a suffix convention:
//!
//! | Member    | Meaning                                   |
//! |-----------|-------------------------------------------|
//! | `name!`   | fire-and-forget call, returns nothing     |
//! | `name?`   | asynchronous call, returns a future       |
//! | `name=`   | attribute write                           |
//! | `name`    | synchronous call, or attribute read       |

use crate::call::{abandon, consume};
use crate::envelope::{Envelope, Hop, submit};
use crate::error::{RpcError, RpcResult};
use crate::future::RemoteFuture;
use parking_lot::Mutex;
use remora_attributes::AttributeStore;
use remora_resource::{Arity, AttributeSpec, Value, into_value};
use remora_store::{Connection, ResourceIdentity, Store, StoreResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

/// Caller-side settings shared by proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProxyOptions {
    /// Default wait for synchronous calls; [`Duration::ZERO`] waits forever.
    pub timeout: Duration,
}

impl ProxyOptions {
    /// Options with the given default timeout.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// A registered member of a resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Remote method with its arity.
    Method(Arity),
    /// Remote attribute with its access.
    Attribute(AttributeSpec),
}

/// Snapshot of a class's registered members.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    members: HashMap<String, Capability>,
}

impl Capabilities {
    /// Reads the registered method and attribute sets of `identity`'s class.
    ///
    /// Entries that do not parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn load(conn: &mut dyn Connection, identity: &ResourceIdentity) -> StoreResult<Self> {
        let keys = identity.keys();
        let mut members = HashMap::new();
        for (name, raw) in conn.hgetall(&keys.attributes())? {
            match AttributeSpec::parse(&raw) {
                Some(spec) => {
                    members.insert(name, Capability::Attribute(spec));
                }
                None => tracing::warn!(class = identity.class(), attribute = %name, raw, "skipping unparsable attribute"),
            }
        }
        for (name, raw) in conn.hgetall(&keys.methods())? {
            match Arity::parse(&raw) {
                Some(arity) => {
                    members.insert(name, Capability::Method(arity));
                }
                None => tracing::warn!(class = identity.class(), method = %name, raw, "skipping unparsable method"),
            }
        }
        Ok(Self { members })
    }

    /// The member registered as `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Capability> {
        self.members.get(name).copied()
    }

    /// Number of registered members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// How a method call is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Block for the result.
    Sync,
    /// Return a [`RemoteFuture`].
    Async,
    /// Submit and return at once.
    FireAndForget,
}

/// A member name resolved against the capability snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess<'a> {
    /// Call a remote method.
    MethodCall {
        /// Method name without suffix.
        method: &'a str,
        /// How to call it.
        mode: CallMode,
    },
    /// Read an attribute from the store.
    AttributeRead(&'a str),
    /// Write an attribute to the store.
    AttributeWrite(&'a str),
}

/// What [`Proxy::dispatch`] produced.
#[derive(Debug)]
pub enum Reply {
    /// Result of a synchronous call or attribute read.
    Value(Value),
    /// Handle on an asynchronous call.
    Future(RemoteFuture),
    /// A fire-and-forget call was submitted, or an attribute was written.
    Done,
}

/// Handle on one remote resource instance.
pub struct Proxy {
    store: Store,
    identity: ResourceIdentity,
    capabilities: Capabilities,
    options: ProxyOptions,
    conn: Mutex<Option<Box<dyn Connection>>>,
    attributes: Mutex<Option<AttributeStore>>,
}

impl core::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Proxy")
            .field("identity", &self.identity)
            .field("members", &self.capabilities.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Proxy {
    /// Proxy for the instance `name` of the logical `class`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the capability snapshot cannot be read.
    pub fn new(store: &Store, class: &str, name: &str) -> RpcResult<Self> {
        Self::for_identity(store, ResourceIdentity::new(class, name))
    }

    /// Proxy for a resolved identity.
    ///
    /// # Errors
    ///
    /// Returns a store error if the capability snapshot cannot be read.
    pub fn for_identity(store: &Store, identity: ResourceIdentity) -> RpcResult<Self> {
        let mut conn = store.connect()?;
        let capabilities = Capabilities::load(conn.as_mut(), &identity)?;
        let proxy = Self::with_capabilities(store, identity, capabilities);
        *proxy.conn.lock() = Some(conn);
        Ok(proxy)
    }

    pub(crate) fn with_capabilities(
        store: &Store,
        identity: ResourceIdentity,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            store: store.clone(),
            identity,
            capabilities,
            options: ProxyOptions::default(),
            conn: Mutex::new(None),
            attributes: Mutex::new(None),
        }
    }

    /// Replaces the caller-side settings.
    #[must_use]
    pub fn with_options(mut self, options: ProxyOptions) -> Self {
        self.options = options;
        self
    }

    /// Identity of the target instance.
    #[must_use]
    pub fn identity(&self) -> &ResourceIdentity {
        &self.identity
    }

    /// Namespaced instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.identity.name()
    }

    /// The capability snapshot.
    #[must_use]
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Re-reads the capability snapshot.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn refresh(&mut self) -> RpcResult<()> {
        let identity = self.identity.clone();
        self.capabilities = self.with_conn(|conn| Ok(Capabilities::load(conn, &identity)?))?;
        *self.attributes.lock() = None;
        Ok(())
    }

    /// The params the instance registered with, if any.
    ///
    /// # Errors
    ///
    /// Returns a store or serialization error.
    pub fn params(&self) -> RpcResult<Option<Value>> {
        let key = self.identity.keys().params();
        let raw = self.with_conn(|conn| Ok(conn.get(&key)?))?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Resolves a member name by the suffix convention.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoSuchMember`] for names that are not registered
    /// or do not fit the suffix, and [`RpcError::AttributeAccess`] for
    /// attributes not exposed for the requested access.
    pub fn resolve<'a>(&self, member: &'a str) -> RpcResult<MemberAccess<'a>> {
        let (name, suffix) = match member.char_indices().last() {
            Some((at, c @ ('!' | '?' | '='))) => (&member[..at], Some(c)),
            _ => (member, None),
        };
        let access = match (self.capabilities.get(name), suffix) {
            (Some(Capability::Method(_)), None) => MemberAccess::MethodCall {
                method: name,
                mode: CallMode::Sync,
            },
            (Some(Capability::Method(_)), Some('?')) => MemberAccess::MethodCall {
                method: name,
                mode: CallMode::Async,
            },
            (Some(Capability::Method(_)), Some('!')) => MemberAccess::MethodCall {
                method: name,
                mode: CallMode::FireAndForget,
            },
            (Some(Capability::Attribute(spec)), None) => {
                if !spec.access.can_read() {
                    return Err(self.access_error(name, "readable"));
                }
                MemberAccess::AttributeRead(name)
            }
            (Some(Capability::Attribute(spec)), Some('=')) => {
                if !spec.access.can_write() {
                    return Err(self.access_error(name, "writable"));
                }
                MemberAccess::AttributeWrite(name)
            }
            _ => {
                return Err(RpcError::NoSuchMember {
                    resource: self.identity.clone(),
                    member: member.to_string(),
                });
            }
        };
        Ok(access)
    }

    /// Accesses `member` by the suffix convention.
    ///
    /// Method calls pass `args` through. Attribute reads take no values and
    /// attribute writes take exactly one.
    ///
    /// # Errors
    ///
    /// Returns a resolution error (see [`resolve`](Self::resolve)),
    /// [`RpcError::InvalidArguments`] for a wrong number of attribute
    /// values, or any error of the underlying call.
    pub fn dispatch(&self, member: &str, mut args: Vec<Value>) -> RpcResult<Reply> {
        match self.resolve(member)? {
            MemberAccess::MethodCall { method, mode } => match mode {
                CallMode::Sync => self.call(method, args).map(Reply::Value),
                CallMode::Async => self.call_async(method, args).map(Reply::Future),
                CallMode::FireAndForget => self.send(method, args).map(|()| Reply::Done),
            },
            MemberAccess::AttributeRead(name) => {
                if !args.is_empty() {
                    return Err(invalid_arguments(member, "attribute reads take no values"));
                }
                let value = self.attributes(|attrs| Ok(attrs.get_value(name)?))?;
                Ok(Reply::Value(value.unwrap_or(Value::Null)))
            }
            MemberAccess::AttributeWrite(name) => {
                let (Some(value), true) = (args.pop(), args.is_empty()) else {
                    return Err(invalid_arguments(member, "attribute writes take exactly one value"));
                };
                self.attributes(|attrs| Ok(attrs.set(name, &value)?))?;
                Ok(Reply::Done)
            }
        }
    }

    /// Calls `method` and blocks for the result, up to the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Remote`] with the remote method's error,
    /// [`RpcError::Timeout`], [`RpcError::NoSuchMember`] if `method` is not
    /// a registered method, or a store error.
    pub fn call(&self, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.call_with_timeout(method, args, self.options.timeout)
    }

    /// [`call`](Self::call) with an explicit timeout.
    ///
    /// On timeout the token is abandoned: a late result is discarded by the
    /// dispatcher instead of being left in the store.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub fn call_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> RpcResult<Value> {
        self.require_method(method)?;
        let identity = self.identity.clone();
        let mut envelope = Envelope::call(identity.clone(), method, args);
        self.with_conn(|conn| {
            let token = submit(conn, &mut envelope)?;
            match consume(conn, &identity, &token, timeout)? {
                Some(outcome) => outcome.map_err(RpcError::Remote),
                None => {
                    abandon(conn, &identity, &token)?;
                    Err(RpcError::Timeout {
                        resource: identity.clone(),
                        method: method.to_string(),
                        timeout,
                    })
                }
            }
        })
    }

    /// Calls `method` and decodes the result as `T`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call); also a serialization error if the result
    /// does not decode.
    pub fn call_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> RpcResult<T> {
        Ok(serde_json::from_value(self.call(method, args)?)?)
    }

    /// Submits `method` and returns a future for its result.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoSuchMember`] or a store error.
    pub fn call_async(&self, method: &str, args: Vec<Value>) -> RpcResult<RemoteFuture> {
        self.require_method(method)?;
        let mut envelope = Envelope::call(self.identity.clone(), method, args);
        let token = self.with_conn(|conn| submit(conn, &mut envelope))?;
        Ok(RemoteFuture::new(&self.store, self.identity.clone(), token, method))
    }

    /// Submits `method` without waiting. Remote errors are only logged by
    /// the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoSuchMember`] or a store error.
    pub fn send(&self, method: &str, args: Vec<Value>) -> RpcResult<()> {
        self.require_method(method)?;
        let mut envelope = Envelope::call(self.identity.clone(), method, args).fire_and_forget();
        self.with_conn(|conn| submit(conn, &mut envelope))?;
        Ok(())
    }

    /// Reads attribute `name`, decoded as `T`.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if the attribute is not readable, or a
    /// store or serialization error.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> RpcResult<Option<T>> {
        match self.resolve(name)? {
            MemberAccess::AttributeRead(name) => self.attributes(|attrs| Ok(attrs.get(name)?)),
            _ => Err(self.not_an_attribute(name)),
        }
    }

    /// Writes attribute `name`. Returns `true` if the value changed.
    ///
    /// # Errors
    ///
    /// Returns a resolution error if the attribute is not writable, or a
    /// store or serialization error.
    pub fn set<T: Serialize>(&self, name: &str, value: &T) -> RpcResult<bool> {
        let value = into_value(value).map_err(RpcError::Remote)?;
        match self.resolve(&format!("{name}="))? {
            MemberAccess::AttributeWrite(_) => self.attributes(|attrs| Ok(attrs.set(name, &value)?)),
            _ => Err(self.not_an_attribute(name)),
        }
    }

    /// Starts a multi-hop call at this resource.
    #[must_use]
    pub fn route(&self, method: &str, args: Vec<Value>) -> Route {
        Route::new(&self.store)
            .with_options(self.options)
            .then(self, method, args)
    }

    fn require_method(&self, method: &str) -> RpcResult<()> {
        match self.capabilities.get(method) {
            Some(Capability::Method(_)) => Ok(()),
            _ => Err(RpcError::NoSuchMember {
                resource: self.identity.clone(),
                member: method.to_string(),
            }),
        }
    }

    fn access_error(&self, attribute: &str, access: &'static str) -> RpcError {
        RpcError::AttributeAccess {
            resource: self.identity.clone(),
            attribute: attribute.to_string(),
            access,
        }
    }

    fn not_an_attribute(&self, name: &str) -> RpcError {
        RpcError::NoSuchMember {
            resource: self.identity.clone(),
            member: name.to_string(),
        }
    }

    /// Runs `body` on the proxy's idle connection, or a fresh one if
    /// another caller is using it. The slot is not locked while `body` runs.
    fn with_conn<R>(&self, body: impl FnOnce(&mut dyn Connection) -> RpcResult<R>) -> RpcResult<R> {
        let idle = self.conn.lock().take();
        let mut conn = match idle {
            Some(conn) => conn,
            None => self.store.connect()?,
        };
        let result = body(conn.as_mut());
        let broken = matches!(&result, Err(RpcError::Store(err)) if err.is_connectivity());
        if !broken {
            let mut slot = self.conn.lock();
            if slot.is_none() {
                *slot = Some(conn);
            }
        }
        result
    }

    fn attributes<R>(&self, body: impl FnOnce(&mut AttributeStore) -> RpcResult<R>) -> RpcResult<R> {
        let mut slot = self.attributes.lock();
        let attrs = match slot.take() {
            Some(attrs) => attrs,
            None => {
                let mut attrs = AttributeStore::open(&self.store, self.identity.clone())?;
                for (name, capability) in &self.capabilities.members {
                    if let Capability::Attribute(AttributeSpec { ttl: Some(ttl), .. }) = capability {
                        attrs = attrs.with_ttl(name.clone(), *ttl);
                    }
                }
                attrs
            }
        };
        body(slot.insert(attrs))
    }
}

fn invalid_arguments(member: &str, reason: &str) -> RpcError {
    RpcError::InvalidArguments {
        member: member.to_string(),
        reason: reason.to_string(),
    }
}

/// A multi-hop call.
///
/// Each hop after the first receives the previous hop's result as an extra
/// trailing argument; only the last hop's result comes back to the caller.
///
/// ```ignore
/// let total = parser
///     .route("parse", vec![json!("2 3")])
///     .then(&adder, "sum", vec![])
///     .call()?;
/// ```
#[derive(Debug, Clone)]
pub struct Route {
    store: Store,
    options: ProxyOptions,
    hops: Vec<Hop>,
}

impl Route {
    /// Empty route over `store`.
    #[must_use]
    pub fn new(store: &Store) -> Self {
        Self {
            store: store.clone(),
            options: ProxyOptions::default(),
            hops: Vec::new(),
        }
    }

    /// Replaces the caller-side settings.
    #[must_use]
    pub fn with_options(mut self, options: ProxyOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a hop calling `method` on `proxy`'s resource.
    #[must_use]
    pub fn then(self, proxy: &Proxy, method: &str, args: Vec<Value>) -> Self {
        self.hop(proxy.identity().clone(), method, args)
    }

    /// Appends a hop calling `method` on `destination`.
    #[must_use]
    pub fn hop(mut self, destination: ResourceIdentity, method: &str, args: Vec<Value>) -> Self {
        self.hops.push(Hop::new(destination, method, args));
        self
    }

    /// Number of hops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Returns `true` when no hop was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    fn origin(&self) -> RpcResult<(ResourceIdentity, String)> {
        let head = self
            .hops
            .first()
            .ok_or_else(|| RpcError::InvalidPath("no hops to execute".into()))?;
        let tail = self.hops.last().map_or("", |hop| hop.method.as_str());
        Ok((head.destination.clone(), tail.to_string()))
    }

    /// Runs the route and blocks for the last hop's result, up to the
    /// default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidPath`] for an empty route, the first
    /// remote error along the route, [`RpcError::Timeout`], or a store
    /// error.
    pub fn call(self) -> RpcResult<Value> {
        let timeout = self.options.timeout;
        let (origin, method) = self.origin()?;
        let mut conn = self.store.connect()?;
        let mut envelope = Envelope::with_path(self.hops);
        let token = submit(conn.as_mut(), &mut envelope)?;
        match consume(conn.as_mut(), &origin, &token, timeout)? {
            Some(outcome) => outcome.map_err(RpcError::Remote),
            None => {
                abandon(conn.as_mut(), &origin, &token)?;
                Err(RpcError::Timeout {
                    resource: origin,
                    method,
                    timeout,
                })
            }
        }
    }

    /// Runs the route and returns a future for the last hop's result.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidPath`] for an empty route, or a store
    /// error.
    pub fn call_async(self) -> RpcResult<RemoteFuture> {
        let (origin, method) = self.origin()?;
        let mut envelope = Envelope::with_path(self.hops);
        let token = submit(self.store.connect()?.as_mut(), &mut envelope)?;
        Ok(RemoteFuture::new(&self.store, origin, token, method))
    }

    /// Runs the route without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidPath`] for an empty route, or a store
    /// error.
    pub fn send(self) -> RpcResult<()> {
        self.origin()?;
        let mut envelope = Envelope::with_path(self.hops).fire_and_forget();
        submit(self.store.connect()?.as_mut(), &mut envelope)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remora_resource::Access;

    fn proxy() -> Proxy {
        let store = Store::memory();
        let mut conn = store.connect().unwrap();
        let identity = ResourceIdentity::new("Calc", "main");
        let keys = identity.keys();
        conn.hset_all(&keys.methods(), &[("add", "2"), ("log", "0+")]);
        conn.hset_all(
            &keys.attributes(),
            &[("total", "r"), ("mode", "w"), ("precision", "rw")],
        );
        Proxy::for_identity(&store, identity).unwrap()
    }

    trait HsetAll {
        fn hset_all(&mut self, key: &str, fields: &[(&str, &str)]);
    }

    impl HsetAll for Box<dyn Connection> {
        fn hset_all(&mut self, key: &str, fields: &[(&str, &str)]) {
            let ops: Vec<_> = fields
                .iter()
                .map(|(field, value)| remora_store::WriteOp::hset(key, *field, *value))
                .collect();
            assert!(self.exec(&ops).unwrap());
        }
    }

    #[test]
    fn snapshot_parses_methods_and_attributes() {
        let proxy = proxy();
        let caps = proxy.capabilities();
        assert_eq!(caps.len(), 5);
        assert_eq!(caps.get("add"), Some(Capability::Method(Arity::Exact(2))));
        assert_eq!(caps.get("log"), Some(Capability::Method(Arity::AtLeast(0))));
        assert_eq!(
            caps.get("precision"),
            Some(Capability::Attribute(AttributeSpec::new(Access::ReadWrite)))
        );
    }

    #[test]
    fn suffixes_select_the_access() {
        let proxy = proxy();
        assert_eq!(
            proxy.resolve("add").unwrap(),
            MemberAccess::MethodCall { method: "add", mode: CallMode::Sync }
        );
        assert_eq!(
            proxy.resolve("add?").unwrap(),
            MemberAccess::MethodCall { method: "add", mode: CallMode::Async }
        );
        assert_eq!(
            proxy.resolve("add!").unwrap(),
            MemberAccess::MethodCall { method: "add", mode: CallMode::FireAndForget }
        );
        assert_eq!(proxy.resolve("total").unwrap(), MemberAccess::AttributeRead("total"));
        assert_eq!(proxy.resolve("mode=").unwrap(), MemberAccess::AttributeWrite("mode"));
        assert_eq!(proxy.resolve("precision=").unwrap(), MemberAccess::AttributeWrite("precision"));
    }

    #[test]
    fn unknown_or_mismatched_members_are_rejected() {
        let proxy = proxy();
        for member in ["missing", "missing?", "add=", "total!", "total?", ""] {
            assert!(
                matches!(proxy.resolve(member), Err(RpcError::NoSuchMember { .. })),
                "{member} should not resolve"
            );
        }
    }

    #[test]
    fn attribute_access_is_checked() {
        let proxy = proxy();
        assert!(matches!(
            proxy.resolve("mode"),
            Err(RpcError::AttributeAccess { access: "readable", .. })
        ));
        assert!(matches!(
            proxy.resolve("total="),
            Err(RpcError::AttributeAccess { access: "writable", .. })
        ));
    }

    #[test]
    fn attributes_round_trip_through_the_store() {
        let proxy = proxy();
        assert!(proxy.set("precision", &3).unwrap());
        assert_eq!(proxy.get::<i64>("precision").unwrap(), Some(3));
        assert!(matches!(
            proxy.dispatch("precision", vec![]).unwrap(),
            Reply::Value(v) if v == 3
        ));
        assert!(matches!(
            proxy.dispatch("precision=", vec![]),
            Err(RpcError::InvalidArguments { .. })
        ));
        assert!(matches!(
            proxy.dispatch("total", vec![]).unwrap(),
            Reply::Value(Value::Null)
        ));
    }

    #[test]
    fn calls_to_attributes_are_rejected_before_submission() {
        let proxy = proxy();
        let before = proxy.store.key_count().unwrap();
        assert!(matches!(proxy.call("total", vec![]), Err(RpcError::NoSuchMember { .. })));
        assert_eq!(proxy.store.key_count().unwrap(), before);
    }

    #[test]
    fn empty_routes_are_invalid() {
        let route = Route::new(&Store::memory());
        assert!(route.is_empty());
        assert!(matches!(route.call(), Err(RpcError::InvalidPath(_))));
    }
}
