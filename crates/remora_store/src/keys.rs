//! Key namespacing.
//!
//! Every key is dot-separated and rooted at `<class>.<name>`. Both parts are
//! derived from their logical identifiers by [`namespace`]: `CamelCase`
//! becomes `snake_case` and `::` module separators become `-`.
//!
//! ```
//! use remora_store::keys::{ResourceIdentity, namespace};
//!
//! assert_eq!(namespace("Billing::InvoiceQueue"), "billing-invoice_queue");
//!
//! let id = ResourceIdentity::new("Billing::InvoiceQueue", "EU");
//! assert_eq!(id.keys().pending(), "billing-invoice_queue.eu.pending");
//! ```

use serde::{Deserialize, Serialize};

/// Name of the class-level pseudo-instance.
pub const CLASS_INSTANCE: &str = "class";

/// Folds a logical identifier into its store form.
#[must_use]
pub fn namespace(logical: &str) -> String {
    logical
        .split("::")
        .map(underscore)
        .collect::<Vec<_>>()
        .join("-")
}

fn underscore(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(word.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                // "fooBar" -> foo_bar, "v2Api" -> v2_api, "HTTPServer" -> http_server
                if prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower)
                {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The `(class, name)` pair identifying a resource instance.
///
/// Both parts are stored in namespaced form; constructing an identity from
/// already-namespaced strings is a no-op fold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentity {
    class: String,
    name: String,
}

impl ResourceIdentity {
    /// Creates an identity from a logical class and instance name.
    #[must_use]
    pub fn new(class: &str, name: &str) -> Self {
        Self {
            class: namespace(class),
            name: namespace(name),
        }
    }

    /// The class-level pseudo-instance of `class`.
    #[must_use]
    pub fn class_level(class: &str) -> Self {
        Self::new(class, CLASS_INSTANCE)
    }

    /// Namespaced class.
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Namespaced instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` for the class-level pseudo-instance.
    #[must_use]
    pub fn is_class_level(&self) -> bool {
        self.name == CLASS_INSTANCE
    }

    /// Key builder rooted at this identity.
    #[must_use]
    pub fn keys(&self) -> Keys {
        Keys {
            class_root: format!("{}.{CLASS_INSTANCE}", self.class),
            root: format!("{}.{}", self.class, self.name),
        }
    }
}

impl core::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}", self.class, self.name)
    }
}

/// Builds the store keys and channels for one resource identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    class_root: String,
    root: String,
}

impl Keys {
    /// Builds keys for the class-level pseudo-instance of a namespaced class.
    #[must_use]
    pub fn for_class(class: &str) -> Self {
        ResourceIdentity::class_level(class).keys()
    }

    /// `<class>.<name>`
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Hash of remote method name → arity.
    #[must_use]
    pub fn methods(&self) -> String {
        format!("{}.methods", self.class_root)
    }

    /// Hash of remote attribute name → access spec.
    #[must_use]
    pub fn attributes(&self) -> String {
        format!("{}.attributes", self.class_root)
    }

    /// Hash of instance name → live count.
    #[must_use]
    pub fn instances(&self) -> String {
        format!("{}.instances", self.class_root)
    }

    /// Channel carrying registry events for the class.
    #[must_use]
    pub fn events(&self) -> String {
        format!("{}.events", self.class_root)
    }

    /// Channel carrying registry events for this instance alone.
    ///
    /// For the class-level pseudo-instance this is the class channel.
    #[must_use]
    pub fn instance_events(&self) -> String {
        format!("{}.events", self.root)
    }

    /// Serialized initialization parameters of the instance.
    #[must_use]
    pub fn params(&self) -> String {
        format!("{}.params", self.root)
    }

    /// List of pending token ids.
    #[must_use]
    pub fn pending(&self) -> String {
        format!("{}.pending", self.root)
    }

    /// List of claimed token ids.
    #[must_use]
    pub fn in_progress(&self) -> String {
        format!("{}.in_progress", self.root)
    }

    /// Detail record of a token.
    #[must_use]
    pub fn token(&self, token: &str) -> String {
        format!("{}.token.{token}", self.root)
    }

    /// Result slot of a token.
    #[must_use]
    pub fn result(&self, token: &str) -> String {
        format!("{}.token.{token}.result", self.root)
    }

    /// Prefix shared by all attribute keys of the instance.
    #[must_use]
    pub fn attribute_prefix(&self) -> String {
        format!("{}.attributes.", self.root)
    }

    /// Attribute record; also the channel its changes are published on.
    #[must_use]
    pub fn attribute(&self, key: &str) -> String {
        format!("{}{key}", self.attribute_prefix())
    }

    /// Private channel that ends a subscriber session.
    #[must_use]
    pub fn unsubscribe(&self, session: &str) -> String {
        format!("{}.unsubscribe.{session}", self.root)
    }
}
