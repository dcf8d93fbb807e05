//! The [`RemoteResource`] trait and checked invocation.

use crate::descriptor::ResourceDescriptor;
use crate::error::RemoteError;
use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// An object whose methods and attributes can be reached from other
/// processes.
///
/// Usually implemented by `#[resource]` on an inherent impl block. Manual
/// implementations must keep [`invoke`](Self::invoke) in line with the
/// method table of [`descriptor`](Self::descriptor).
pub trait RemoteResource: Send + Sync + 'static {
    /// Capabilities shared by every instance of the type.
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Runs the remote method `method` with positional `args`.
    ///
    /// # Errors
    ///
    /// Returns the method's own error, or a protocol error for unknown
    /// methods and undecodable arguments.
    fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError>;

    /// Value of an attribute held in process, such as the name attribute.
    fn local_attribute(&self, key: &str) -> Option<Value> {
        let _ = key;
        None
    }

    /// Initialization parameters stored on registration.
    fn params(&self) -> Option<Value> {
        None
    }

    /// Called once each time a dispatcher starts serving this resource.
    ///
    /// # Errors
    ///
    /// An error stops the dispatcher from serving.
    fn on_resource_start(&self) -> Result<(), RemoteError> {
        Ok(())
    }

    /// Called once each time a dispatcher serving this resource stops.
    ///
    /// # Errors
    ///
    /// An error is logged; the dispatcher stops regardless.
    fn on_resource_stop(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Invokes `method` after checking it against the descriptor.
///
/// Unknown methods and wrong argument counts fail without running the
/// method body. Panics inside the method are caught and returned as
/// errors of kind `Panic`.
///
/// # Errors
///
/// Returns the protocol error, the method's error, or the caught panic.
pub fn invoke_checked(
    resource: &dyn RemoteResource,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, RemoteError> {
    let descriptor = resource.descriptor();
    let Some(arity) = descriptor.method(method) else {
        return Err(RemoteError::undefined_method(descriptor.class(), method));
    };
    arity.check(method, args.len())?;

    match catch_unwind(AssertUnwindSafe(|| resource.invoke(method, args))) {
        Ok(result) => result,
        Err(payload) => {
            let err = RemoteError::panic(payload.as_ref());
            tracing::warn!(class = descriptor.class(), method, message = %err.message, "remote method panicked");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Arity;
    use crate::error::kinds;
    use serde_json::json;
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Probe {
        runs: AtomicUsize,
    }

    impl RemoteResource for Probe {
        fn descriptor(&self) -> &ResourceDescriptor {
            static DESCRIPTOR: OnceLock<ResourceDescriptor> = OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                ResourceDescriptor::builder("Probe")
                    .method("ping", Arity::Exact(0))
                    .method("pair", Arity::Exact(2))
                    .method("explode", Arity::Exact(0))
                    .build()
            })
        }

        fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, RemoteError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match method {
                "ping" => Ok(json!("pong")),
                "pair" => Ok(Value::Array(args)),
                "explode" => panic!("exploded"),
                other => Err(RemoteError::undefined_method("Probe", other)),
            }
        }
    }

    #[test]
    fn arity_mismatch_never_runs_the_body() {
        let probe = Probe::default();

        let err = invoke_checked(&probe, "ping", vec![json!(1)]).unwrap_err();
        assert!(err.is(kinds::ARGUMENT_COUNT));
        let err = invoke_checked(&probe, "pair", vec![json!(1)]).unwrap_err();
        assert!(err.is(kinds::ARGUMENT_COUNT));
        let err = invoke_checked(&probe, "pair", vec![json!(1), json!(2), json!(3)]).unwrap_err();
        assert!(err.is(kinds::ARGUMENT_COUNT));

        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_methods_never_run() {
        let probe = Probe::default();
        let err = invoke_checked(&probe, "launch", Vec::new()).unwrap_err();
        assert!(err.is(kinds::UNDEFINED_METHOD));
        assert_eq!(probe.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn valid_calls_run_once() {
        let probe = Probe::default();
        assert_eq!(invoke_checked(&probe, "ping", Vec::new()).unwrap(), json!("pong"));
        assert_eq!(
            invoke_checked(&probe, "pair", vec![json!(1), json!(2)]).unwrap(),
            json!([1, 2])
        );
        assert_eq!(probe.runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panics_become_errors() {
        let probe = Probe::default();
        let err = invoke_checked(&probe, "explode", Vec::new()).unwrap_err();
        assert!(err.is(kinds::PANIC));
        assert_eq!(err.message, "exploded");
    }
}
