//! Store identity of a declared resource.

use remora_resource::{RemoteResource, ResourceError, resolve_name};
use remora_store::ResourceIdentity;

/// The `(class, name)` identity `resource` is registered under.
///
/// Resources without a name attribute are the class-level pseudo-instance.
///
/// # Errors
///
/// Propagates [`resolve_name`] failures: a missing name value or circular
/// resolution.
pub fn identity_of(resource: &dyn RemoteResource) -> Result<ResourceIdentity, ResourceError> {
    let class = resource.descriptor().class();
    Ok(match resolve_name(resource)? {
        Some(name) => ResourceIdentity::new(class, &name),
        None => ResourceIdentity::class_level(class),
    })
}
