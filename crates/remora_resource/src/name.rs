//! Resolution of an instance's discovery name.
//!
//! The name attribute is read through [`RemoteResource::local_attribute`].
//! If reading it re-enters name resolution for the same instance on the
//! same thread (for example a name hook that looks itself up in the store),
//! the inner call fails with [`ResourceError::CircularName`] instead of
//! recursing. Other instances of the class resolve normally.

use crate::error::ResourceError;
use crate::resource::RemoteResource;
use serde_json::Value;
use std::cell::RefCell;

thread_local! {
    static RESOLVING: RefCell<Vec<(String, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Marks an instance as being resolved on the current thread until dropped.
#[derive(Debug)]
pub struct NameGuard {
    key: (String, usize),
}

impl NameGuard {
    /// Enters resolution for `resource`, keyed by its class and address.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::CircularName`] if this thread is already
    /// resolving the name of `resource`.
    pub fn enter(resource: &dyn RemoteResource, attribute: &str) -> Result<Self, ResourceError> {
        let class = resource.descriptor().class();
        let key = (
            class.to_string(),
            core::ptr::from_ref(resource).cast::<()>().addr(),
        );
        RESOLVING.with_borrow_mut(|active| {
            if active.contains(&key) {
                return Err(ResourceError::circular_name(class, attribute));
            }
            active.push(key.clone());
            Ok(Self { key })
        })
    }
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        RESOLVING.with_borrow_mut(|active| {
            if let Some(pos) = active.iter().rposition(|key| *key == self.key) {
                active.remove(pos);
            }
        });
    }
}

/// Reads the logical instance name of `resource`.
///
/// Returns `Ok(None)` when the type declares no name attribute, meaning the
/// resource is the class-level pseudo-instance.
///
/// # Errors
///
/// Returns [`ResourceError::CircularName`] on re-entrant resolution and
/// [`ResourceError::MissingName`] when the attribute is absent, null or an
/// empty string.
pub fn resolve_name(resource: &dyn RemoteResource) -> Result<Option<String>, ResourceError> {
    let descriptor = resource.descriptor();
    let Some(attribute) = descriptor.name_attribute() else {
        return Ok(None);
    };

    let _guard = NameGuard::enter(resource, attribute)?;
    let name = match resource.local_attribute(attribute) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    if name.is_empty() {
        return Err(ResourceError::missing_name(descriptor.class(), attribute));
    }
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceDescriptor;
    use crate::error::RemoteError;
    use serde_json::json;
    use std::sync::OnceLock;

    struct Named(Option<Value>);

    impl RemoteResource for Named {
        fn descriptor(&self) -> &ResourceDescriptor {
            static DESCRIPTOR: OnceLock<ResourceDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ResourceDescriptor::builder("Named")
                    .reader("id")
                    .name_attribute("id")
                    .build()
            })
        }

        fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value, RemoteError> {
            Err(RemoteError::undefined_method("Named", method))
        }

        fn local_attribute(&self, key: &str) -> Option<Value> {
            (key == "id").then(|| self.0.clone()).flatten()
        }
    }

    struct Selfish;

    impl RemoteResource for Selfish {
        fn descriptor(&self) -> &ResourceDescriptor {
            static DESCRIPTOR: OnceLock<ResourceDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ResourceDescriptor::builder("Selfish")
                    .name_attribute("id")
                    .build()
            })
        }

        fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value, RemoteError> {
            Err(RemoteError::undefined_method("Selfish", method))
        }

        fn local_attribute(&self, _key: &str) -> Option<Value> {
            // Looking up our own name to find where "id" is stored.
            let inner = resolve_name(self);
            assert!(matches!(inner, Err(ResourceError::CircularName { .. })));
            None
        }
    }

    #[test]
    fn strings_and_numbers_become_names() {
        assert_eq!(
            resolve_name(&Named(Some(json!("eu-1")))).unwrap(),
            Some("eu-1".to_string())
        );
        assert_eq!(
            resolve_name(&Named(Some(json!(7)))).unwrap(),
            Some("7".to_string())
        );
    }

    #[test]
    fn null_or_empty_is_missing() {
        for value in [None, Some(Value::Null), Some(json!(""))] {
            let err = resolve_name(&Named(value)).unwrap_err();
            assert_eq!(err, ResourceError::missing_name("Named", "id"));
        }
    }

    /// Names itself after the instance it follows.
    struct Follower {
        id: &'static str,
        leader: Option<Box<Follower>>,
    }

    impl RemoteResource for Follower {
        fn descriptor(&self) -> &ResourceDescriptor {
            static DESCRIPTOR: OnceLock<ResourceDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ResourceDescriptor::builder("Follower")
                    .name_attribute("id")
                    .build()
            })
        }

        fn invoke(&self, method: &str, _args: Vec<Value>) -> Result<Value, RemoteError> {
            Err(RemoteError::undefined_method("Follower", method))
        }

        fn local_attribute(&self, _key: &str) -> Option<Value> {
            let Some(leader) = &self.leader else {
                return Some(json!(self.id));
            };
            let leader = resolve_name(leader.as_ref()).ok().flatten()?;
            Some(json!(format!("{}-after-{leader}", self.id)))
        }
    }

    #[test]
    fn reentrant_resolution_fails_fast() {
        let err = resolve_name(&Selfish).unwrap_err();
        assert_eq!(err, ResourceError::missing_name("Selfish", "id"));
        // The guard is released afterwards.
        assert!(NameGuard::enter(&Selfish, "id").is_ok());
    }

    #[test]
    fn other_instances_of_the_class_resolve_inside_a_name_hook() {
        let follower = Follower {
            id: "b",
            leader: Some(Box::new(Follower {
                id: "a",
                leader: None,
            })),
        };
        assert_eq!(resolve_name(&follower).unwrap().as_deref(), Some("b-after-a"));
    }

    #[test]
    fn guard_is_per_instance() {
        let first = Named(Some(json!("one")));
        let second = Named(Some(json!("two")));
        let _outer = NameGuard::enter(&first, "id").unwrap();
        assert!(NameGuard::enter(&second, "id").is_ok());
        assert!(NameGuard::enter(&first, "id").is_err());
    }
}
