//! Immutable per-type capability descriptors.
//!
//! A [`ResourceDescriptor`] records which methods and attributes a resource
//! type exposes remotely and which attribute supplies an instance's name.
//! It is built once per type (the `#[resource]` macro keeps it in a
//! `OnceLock`) and shared by every instance.
//!
//! Tables are encoded to plain strings for the store: arity as `"N"` or
//! `"N+"`, access as `"r"`, `"w"` or `"rw"` with an optional `;ttl=<ms>`.

use crate::error::{RemoteError, ResourceError};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Arity
// ─────────────────────────────────────────────────────────────────────────────

/// Number of arguments a remote method accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly this many.
    Exact(usize),
    /// This many or more (variadic tail).
    AtLeast(usize),
}

impl Arity {
    /// Returns `true` if `given` arguments satisfy this arity.
    #[must_use]
    pub fn accepts(self, given: usize) -> bool {
        match self {
            Self::Exact(n) => given == n,
            Self::AtLeast(n) => given >= n,
        }
    }

    /// Fails with an argument-count error unless `given` is accepted.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] of kind `ArgumentCountError`.
    pub fn check(self, method: &str, given: usize) -> Result<(), RemoteError> {
        if self.accepts(given) {
            Ok(())
        } else {
            Err(RemoteError::argument_count(method, self, given))
        }
    }

    /// Store encoding.
    #[must_use]
    pub fn encode(self) -> String {
        match self {
            Self::Exact(n) => n.to_string(),
            Self::AtLeast(n) => format!("{n}+"),
        }
    }

    /// Parses the store encoding.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.strip_suffix('+') {
            Some(min) => min.parse().ok().map(Self::AtLeast),
            None => raw.parse().ok().map(Self::Exact),
        }
    }
}

impl core::fmt::Display for Arity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attributes
// ─────────────────────────────────────────────────────────────────────────────

/// Remote visibility of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Remote readers only.
    Read,
    /// Remote writers only.
    Write,
    /// Both.
    ReadWrite,
}

impl Access {
    /// Remote reads allowed.
    #[must_use]
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    /// Remote writes allowed.
    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    fn union(self, other: Self) -> Self {
        if self == other { self } else { Self::ReadWrite }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::ReadWrite => "rw",
        }
    }
}

/// Visibility and expiry of one remote attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeSpec {
    /// Who may access the attribute remotely.
    pub access: Access,
    /// Values expire this long after being written.
    pub ttl: Option<Duration>,
}

impl AttributeSpec {
    /// Spec with the given access and no expiry.
    #[must_use]
    pub fn new(access: Access) -> Self {
        Self { access, ttl: None }
    }

    /// Store encoding.
    #[must_use]
    pub fn encode(&self) -> String {
        match self.ttl {
            Some(ttl) => format!("{};ttl={}", self.access.as_str(), ttl.as_millis()),
            None => self.access.as_str().to_string(),
        }
    }

    /// Parses the store encoding.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (access, ttl) = match raw.split_once(';') {
            Some((access, rest)) => {
                let millis: u64 = rest.strip_prefix("ttl=")?.parse().ok()?;
                (access, Some(Duration::from_millis(millis)))
            }
            None => (raw, None),
        };
        let access = match access {
            "r" => Access::Read,
            "w" => Access::Write,
            "rw" => Access::ReadWrite,
            _ => return None,
        };
        Some(Self { access, ttl })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResourceDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// What a resource type exposes remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    class: String,
    methods: IndexMap<String, Arity>,
    attributes: IndexMap<String, AttributeSpec>,
    name_attribute: Option<String>,
}

impl ResourceDescriptor {
    /// Starts a descriptor for the logical class `class`.
    pub fn builder(class: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            class: class.into(),
            methods: IndexMap::new(),
            attributes: IndexMap::new(),
            name_attribute: None,
        }
    }

    /// Logical class, e.g. `Billing::InvoiceQueue`.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Arity of the remote method `name`.
    #[must_use]
    pub fn method(&self, name: &str) -> Option<Arity> {
        self.methods.get(name).copied()
    }

    /// Remote methods in declaration order.
    #[must_use]
    pub fn methods(&self) -> &IndexMap<String, Arity> {
        &self.methods
    }

    /// Spec of the remote attribute `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<AttributeSpec> {
        self.attributes.get(name).copied()
    }

    /// Remote attributes in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &IndexMap<String, AttributeSpec> {
        &self.attributes
    }

    /// Attribute whose value names each instance.
    #[must_use]
    pub fn name_attribute(&self) -> Option<&str> {
        self.name_attribute.as_deref()
    }

    /// Method set in store encoding.
    #[must_use]
    pub fn method_table(&self) -> BTreeMap<String, String> {
        self.methods
            .iter()
            .map(|(name, arity)| (name.clone(), arity.encode()))
            .collect()
    }

    /// Attribute set in store encoding.
    #[must_use]
    pub fn attribute_table(&self) -> BTreeMap<String, String> {
        self.attributes
            .iter()
            .map(|(name, spec)| (name.clone(), spec.encode()))
            .collect()
    }
}

/// Builder for [`ResourceDescriptor`].
#[derive(Debug)]
pub struct DescriptorBuilder {
    class: String,
    methods: IndexMap<String, Arity>,
    attributes: IndexMap<String, AttributeSpec>,
    name_attribute: Option<String>,
}

impl DescriptorBuilder {
    /// Declares a remote method.
    #[must_use]
    pub fn method(mut self, name: impl Into<String>, arity: Arity) -> Self {
        self.methods.insert(name.into(), arity);
        self
    }

    /// Declares a remotely readable attribute.
    #[must_use]
    pub fn reader(self, name: impl Into<String>) -> Self {
        self.access(name.into(), Access::Read)
    }

    /// Declares a remotely writable attribute.
    #[must_use]
    pub fn writer(self, name: impl Into<String>) -> Self {
        self.access(name.into(), Access::Write)
    }

    /// Declares a remotely readable and writable attribute.
    #[must_use]
    pub fn accessor(self, name: impl Into<String>) -> Self {
        self.access(name.into(), Access::ReadWrite)
    }

    /// Sets the expiry of an attribute, declaring it readable if needed.
    #[must_use]
    pub fn ttl(mut self, name: impl Into<String>, ttl: Duration) -> Self {
        self.attributes
            .entry(name.into())
            .or_insert_with(|| AttributeSpec::new(Access::Read))
            .ttl = Some(ttl);
        self
    }

    /// Names the attribute that supplies each instance's name.
    #[must_use]
    pub fn name_attribute(mut self, name: impl Into<String>) -> Self {
        self.name_attribute = Some(name.into());
        self
    }

    fn access(mut self, name: String, access: Access) -> Self {
        self.attributes
            .entry(name)
            .and_modify(|spec| spec.access = spec.access.union(access))
            .or_insert_with(|| AttributeSpec::new(access));
        self
    }

    /// Finishes the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidDeclaration`] if a member is both a
    /// method and an attribute, or a member name uses a proxy suffix.
    pub fn try_build(self) -> Result<ResourceDescriptor, ResourceError> {
        if self.class.is_empty() {
            return Err(ResourceError::invalid_declaration("empty resource class"));
        }
        for name in self.methods.keys().chain(self.attributes.keys()) {
            if name.is_empty() || name.ends_with(['!', '?', '=']) {
                return Err(ResourceError::invalid_declaration(format!(
                    "'{name}' is not a valid remote member name"
                )));
            }
        }
        if let Some(name) = self.methods.keys().find(|m| self.attributes.contains_key(*m)) {
            return Err(ResourceError::invalid_declaration(format!(
                "'{name}' is declared both as a method and an attribute of {}",
                self.class
            )));
        }
        Ok(ResourceDescriptor {
            class: self.class,
            methods: self.methods,
            attributes: self.attributes,
            name_attribute: self.name_attribute,
        })
    }

    /// Finishes the descriptor.
    ///
    /// # Panics
    ///
    /// Panics on the declaration errors [`try_build`](Self::try_build)
    /// reports. `#[resource]` rejects those at compile time.
    #[must_use]
    pub fn build(self) -> ResourceDescriptor {
        match self.try_build() {
            Ok(descriptor) => descriptor,
            Err(err) => panic!("{err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn arity_encoding() {
        assert_eq!(Arity::Exact(2).encode(), "2");
        assert_eq!(Arity::AtLeast(1).encode(), "1+");
        assert_eq!(Arity::parse("0"), Some(Arity::Exact(0)));
        assert_eq!(Arity::parse("3+"), Some(Arity::AtLeast(3)));
        assert_eq!(Arity::parse("x"), None);
        assert_eq!(Arity::parse("+"), None);
    }

    #[test]
    fn arity_acceptance() {
        assert!(Arity::Exact(0).accepts(0));
        assert!(!Arity::Exact(0).accepts(1));
        assert!(!Arity::Exact(2).accepts(1));
        assert!(!Arity::Exact(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(1));
        assert!(Arity::AtLeast(1).accepts(5));
        assert!(!Arity::AtLeast(1).accepts(0));
    }

    #[test]
    fn attribute_spec_encoding() {
        let spec = AttributeSpec {
            access: Access::ReadWrite,
            ttl: Some(Duration::from_secs(30)),
        };
        assert_eq!(spec.encode(), "rw;ttl=30000");
        assert_eq!(AttributeSpec::parse("rw;ttl=30000"), Some(spec));
        assert_eq!(
            AttributeSpec::parse("w"),
            Some(AttributeSpec::new(Access::Write))
        );
        assert_eq!(AttributeSpec::parse("rx"), None);
        assert_eq!(AttributeSpec::parse("r;ttl="), None);
    }

    #[test]
    fn reader_and_writer_merge_into_accessor() {
        let descriptor = ResourceDescriptor::builder("Counter")
            .reader("value")
            .writer("value")
            .writer("limit")
            .build();

        assert_eq!(descriptor.attribute("value").unwrap().access, Access::ReadWrite);
        assert_eq!(descriptor.attribute("limit").unwrap().access, Access::Write);
    }

    #[test]
    fn ttl_keeps_declared_access() {
        let descriptor = ResourceDescriptor::builder("Session")
            .writer("token")
            .ttl("token", Duration::from_secs(5))
            .ttl("heartbeat", Duration::from_secs(1))
            .build();

        assert_eq!(descriptor.attribute("token").unwrap().access, Access::Write);
        assert_eq!(
            descriptor.attribute("heartbeat"),
            Some(AttributeSpec {
                access: Access::Read,
                ttl: Some(Duration::from_secs(1)),
            })
        );
    }

    #[test]
    fn tables_use_store_encoding() {
        let descriptor = ResourceDescriptor::builder("Calc")
            .method("add", Arity::Exact(2))
            .method("sum", Arity::AtLeast(0))
            .accessor("memory")
            .build();

        let methods = descriptor.method_table();
        assert_eq!(methods["add"], "2");
        assert_eq!(methods["sum"], "0+");
        assert_eq!(descriptor.attribute_table()["memory"], "rw");
    }

    #[test]
    fn member_names_must_be_unambiguous() {
        let clash = ResourceDescriptor::builder("Calc")
            .method("total", Arity::Exact(0))
            .reader("total")
            .try_build();
        assert!(matches!(clash, Err(ResourceError::InvalidDeclaration(_))));

        let suffix = ResourceDescriptor::builder("Calc")
            .method("reset!", Arity::Exact(0))
            .try_build();
        assert!(suffix.is_err());
    }

    proptest! {
        #[test]
        fn exact_arity_accepts_only_its_count(n in 0usize..16, given in 0usize..16) {
            prop_assert_eq!(Arity::Exact(n).accepts(given), given == n);
            prop_assert_eq!(Arity::Exact(n).check("m", given).is_ok(), given == n);
        }

        #[test]
        fn variadic_arity_is_a_lower_bound(n in 0usize..16, given in 0usize..16) {
            prop_assert_eq!(Arity::AtLeast(n).accepts(given), given >= n);
            if given < n {
                let err = Arity::AtLeast(n).check("m", given).unwrap_err();
                prop_assert!(err.is(crate::error::kinds::ARGUMENT_COUNT));
            }
        }
    }
}
