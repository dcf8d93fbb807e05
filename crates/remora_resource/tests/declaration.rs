//! Integration tests for `#[resource]` declarations.

use remora_resource::{
    Access, Arity, RemoteError, RemoteException, RemoteResource, ResourceError, invoke_checked,
    kinds, resolve_name, resource,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────
// 1. Descriptor contents
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("cannot divide {0} by zero")]
struct DivideByZero(i64);

impl RemoteException for DivideByZero {
    const KIND: &'static str = "DivideByZero";
}

#[derive(Default)]
struct Calculator {
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

#[resource(
    class = "Demo::Calculator",
    reader(total),
    writer(mode),
    accessor(precision),
    ttl(heartbeat = 30)
)]
impl Calculator {
    #[remote]
    pub fn add(&self, a: i64, b: i64) -> i64 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        a + b
    }

    #[remote]
    pub fn reset(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    #[remote(variadic)]
    pub fn tag(&self, label: String, values: Vec<i64>) -> String {
        format!("{label}:{}", values.len())
    }

    #[remote]
    pub fn divide(&self, a: i64, b: i64) -> Result<i64, RemoteError> {
        if b == 0 {
            return Err(RemoteError::exception(&DivideByZero(a)));
        }
        Ok(a / b)
    }

    #[remote]
    pub fn parse(&self, raw: String) -> Result<i64, core::num::ParseIntError> {
        raw.parse()
    }

    #[remote]
    pub fn r#type(&self) -> &'static str {
        "calculator"
    }

    /// Not remote: no `#[remote]`.
    pub fn local_only(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[on_start]
    fn started(&self) {
        self.log.lock().unwrap().push("start".into());
    }

    #[on_stop]
    fn stopped(&self) {
        self.log.lock().unwrap().push("stop".into());
    }
}

#[test]
fn descriptor_lists_remote_methods_with_arity() {
    let calc = Calculator::default();
    let descriptor = calc.descriptor();

    assert_eq!(descriptor.class(), "Demo::Calculator");
    assert_eq!(descriptor.method("add"), Some(Arity::Exact(2)));
    assert_eq!(descriptor.method("reset"), Some(Arity::Exact(0)));
    assert_eq!(descriptor.method("tag"), Some(Arity::AtLeast(1)));
    assert_eq!(descriptor.method("type"), Some(Arity::Exact(0)));
    assert_eq!(descriptor.method("local_only"), None);
    assert_eq!(descriptor.method("started"), None);
    assert_eq!(descriptor.name_attribute(), None);
}

#[test]
fn descriptor_lists_attributes_with_access() {
    let calc = Calculator::default();
    let descriptor = calc.descriptor();

    assert_eq!(descriptor.attribute("total").unwrap().access, Access::Read);
    assert_eq!(descriptor.attribute("mode").unwrap().access, Access::Write);
    assert_eq!(
        descriptor.attribute("precision").unwrap().access,
        Access::ReadWrite
    );
    assert_eq!(
        descriptor.attribute("heartbeat").unwrap().ttl,
        Some(Duration::from_secs(30))
    );
}

#[test]
fn descriptor_is_shared_by_instances() {
    let a = Calculator::default();
    let b = Calculator::default();
    assert!(core::ptr::eq(a.descriptor(), b.descriptor()));
}

// ─────────────────────────────────────────────────────────────────────
// 2. Invocation
// ─────────────────────────────────────────────────────────────────────

#[test]
fn invoke_decodes_arguments_and_encodes_results() {
    let calc = Calculator::default();
    assert_eq!(calc.invoke("add", vec![json!(2), json!(3)]).unwrap(), json!(5));
    assert_eq!(calc.invoke("reset", Vec::new()).unwrap(), Value::Null);
    assert_eq!(calc.invoke("type", Vec::new()).unwrap(), json!("calculator"));
}

#[test]
fn variadic_tail_accepts_any_count() {
    let calc = Calculator::default();
    assert_eq!(calc.invoke("tag", vec![json!("n")]).unwrap(), json!("n:0"));
    assert_eq!(
        calc.invoke("tag", vec![json!("n"), json!(1), json!(2), json!(3)])
            .unwrap(),
        json!("n:3")
    );

    let err = invoke_checked(&calc, "tag", Vec::new()).unwrap_err();
    assert!(err.is(kinds::ARGUMENT_COUNT));
}

#[test]
fn checked_invoke_rejects_bad_arity_before_running() {
    let calc = Calculator::default();

    let err = invoke_checked(&calc, "reset", vec![json!(1)]).unwrap_err();
    assert!(err.is(kinds::ARGUMENT_COUNT));
    let err = invoke_checked(&calc, "add", vec![json!(1)]).unwrap_err();
    assert!(err.is(kinds::ARGUMENT_COUNT));
    let err = invoke_checked(&calc, "add", vec![json!(1), json!(2), json!(3)]).unwrap_err();
    assert!(err.is(kinds::ARGUMENT_COUNT));

    assert_eq!(calc.local_only(), 0);
}

#[test]
fn direct_invoke_also_rejects_surplus_arguments() {
    let calc = Calculator::default();
    let err = calc.invoke("reset", vec![json!(1)]).unwrap_err();
    assert!(err.is(kinds::ARGUMENT_COUNT));
    assert_eq!(calc.local_only(), 0);
}

#[test]
fn non_remote_methods_are_undefined() {
    let calc = Calculator::default();
    let err = calc.invoke("local_only", Vec::new()).unwrap_err();
    assert!(err.is(kinds::UNDEFINED_METHOD));
    assert!(err.message.contains("Demo::Calculator"));
}

#[test]
fn method_errors_keep_their_type() {
    let calc = Calculator::default();

    let err = calc.invoke("divide", vec![json!(4), json!(0)]).unwrap_err();
    assert_eq!(err.kind, "DivideByZero");
    assert_eq!(err.reconstruct::<DivideByZero>(), Some(DivideByZero(4)));

    let err = calc.invoke("parse", vec![json!("x")]).unwrap_err();
    assert_eq!(err.kind, "ParseIntError");
    assert_eq!(err.message, "invalid digit found in string");

    assert_eq!(calc.invoke("divide", vec![json!(9), json!(3)]).unwrap(), json!(3));
}

#[test]
fn lifecycle_hooks_run() {
    let calc = Calculator::default();
    calc.on_resource_start().unwrap();
    calc.on_resource_stop().unwrap();
    assert_eq!(*calc.log.lock().unwrap(), vec!["start", "stop"]);
}

#[derive(Debug, thiserror::Error)]
#[error("mount point {0} is missing")]
struct MissingMount(&'static str);

struct Volume;

#[resource(class = "Demo::Volume")]
impl Volume {
    #[remote]
    pub fn size(&self) -> u64 {
        0
    }

    #[on_start]
    fn mount(&self) -> Result<(), MissingMount> {
        Err(MissingMount("/data"))
    }

    #[on_stop]
    fn unmount(&self) -> Result<u8, MissingMount> {
        Ok(0)
    }
}

#[test]
fn fallible_lifecycle_hooks_report_their_errors() {
    let err = Volume.on_resource_start().unwrap_err();
    assert_eq!(err.kind, "MissingMount");
    assert_eq!(err.message, "mount point /data is missing");
    assert!(Volume.on_resource_stop().is_ok());
}

// ─────────────────────────────────────────────────────────────────────
// 3. Names and params
// ─────────────────────────────────────────────────────────────────────

struct Worker {
    region: Option<String>,
}

#[resource(name = "region", reader(region))]
impl Worker {
    #[local_attribute]
    pub fn region(&self) -> Option<String> {
        self.region.clone()
    }

    #[params]
    fn init_params(&self) -> Value {
        json!({ "region": self.region })
    }
}

#[test]
fn class_defaults_to_type_name() {
    let worker = Worker { region: None };
    assert_eq!(worker.descriptor().class(), "Worker");
    assert_eq!(worker.descriptor().name_attribute(), Some("region"));
}

#[test]
fn name_comes_from_the_local_attribute() {
    let worker = Worker {
        region: Some("eu".into()),
    };
    assert_eq!(resolve_name(&worker).unwrap(), Some("eu".to_string()));
    assert_eq!(worker.local_attribute("region"), Some(json!("eu")));
    assert_eq!(worker.local_attribute("other"), None);
    assert_eq!(worker.params(), Some(json!({ "region": "eu" })));
}

#[test]
fn unset_name_is_missing() {
    let worker = Worker { region: None };
    assert_eq!(
        resolve_name(&worker).unwrap_err(),
        ResourceError::missing_name("Worker", "region")
    );
}

#[test]
fn resources_without_a_name_attribute_are_class_level() {
    assert_eq!(resolve_name(&Calculator::default()).unwrap(), None);
}
