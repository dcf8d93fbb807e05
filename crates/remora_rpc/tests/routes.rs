//! Multi-hop calls: each hop's result feeds the next hop.

use remora_resource::resource;
use remora_rpc::{Dispatcher, Proxy, ProxyOptions, Route, RpcError};
use remora_store::{ResourceIdentity, Store};
use serde_json::json;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

struct Parser;

#[resource(class = "Route::Parser")]
impl Parser {
    #[remote]
    pub fn parse(&self, raw: String) -> Result<Vec<i64>, core::num::ParseIntError> {
        raw.split_whitespace().map(str::parse).collect()
    }
}

struct Math;

#[resource(class = "Route::Math")]
impl Math {
    #[remote]
    pub fn scale(&self, factor: i64, values: Vec<i64>) -> Vec<i64> {
        values.into_iter().map(|v| v * factor).collect()
    }

    #[remote]
    pub fn sum(&self, values: Vec<i64>) -> i64 {
        values.iter().sum()
    }
}

struct Fixture {
    store: Store,
    parser: Proxy,
    math: Proxy,
    _dispatchers: Vec<Dispatcher>,
}

fn fixture() -> Fixture {
    let store = Store::memory();
    let mut dispatchers = Vec::new();
    for resource in [
        Arc::new(Parser) as Arc<dyn remora_resource::RemoteResource>,
        Arc::new(Math),
    ] {
        let mut dispatcher = Dispatcher::new(&store, resource).unwrap();
        dispatcher.start().unwrap();
        dispatchers.push(dispatcher);
    }
    let options = ProxyOptions::with_timeout(WAIT);
    Fixture {
        parser: Proxy::new(&store, "Route::Parser", "class")
            .unwrap()
            .with_options(options),
        math: Proxy::new(&store, "Route::Math", "class")
            .unwrap()
            .with_options(options),
        store,
        _dispatchers: dispatchers,
    }
}

fn wait_for_baseline(store: &Store, baseline: u64) {
    let deadline = Instant::now() + WAIT;
    while store.key_count().unwrap() != baseline {
        assert!(Instant::now() < deadline, "store did not return to baseline");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn two_hops_forward_the_result() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();

    let scaled = f
        .parser
        .route("parse", vec![json!("1 2 3")])
        .then(&f.math, "scale", vec![json!(10)])
        .call()
        .unwrap();
    assert_eq!(scaled, json!([10, 20, 30]));
    assert_eq!(f.store.key_count().unwrap(), baseline);
}

#[test]
fn three_hops_deliver_only_the_last_result() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();

    let total = f
        .parser
        .route("parse", vec![json!("1 2 3")])
        .then(&f.math, "scale", vec![json!(2)])
        .then(&f.math, "sum", vec![])
        .call()
        .unwrap();
    assert_eq!(total, json!(12));
    assert_eq!(f.store.key_count().unwrap(), baseline);
}

#[test]
fn hand_off_retires_the_first_hop_before_delivery() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();
    let in_progress = ResourceIdentity::class_level("Route::Parser").keys().in_progress();
    let mut conn = f.store.connect().unwrap();

    for round in 0..50 {
        let total = f
            .parser
            .route("parse", vec![json!(format!("{round} 1"))])
            .then(&f.math, "sum", vec![])
            .call()
            .unwrap();
        assert_eq!(total, json!(round + 1));
        assert!(conn.lrange(&in_progress).unwrap().is_empty());
        assert_eq!(f.store.key_count().unwrap(), baseline);
    }
}

#[test]
fn errors_short_circuit_to_the_caller() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();

    let err = f
        .parser
        .route("parse", vec![json!("1 x")])
        .then(&f.math, "sum", vec![])
        .call()
        .unwrap_err();
    assert_eq!(err.remote().unwrap().kind, "ParseIntError");

    // The second hop receives one argument too many.
    let err = f
        .parser
        .route("parse", vec![json!("1")])
        .then(&f.math, "sum", vec![json!([5])])
        .call()
        .unwrap_err();
    assert!(err.remote().unwrap().is(remora_resource::kinds::ARGUMENT_COUNT));
    assert_eq!(f.store.key_count().unwrap(), baseline);
}

#[test]
fn routes_run_asynchronously_and_in_the_background() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();

    let mut future = Route::new(&f.store)
        .hop(ResourceIdentity::class_level("Route::Parser"), "parse", vec![json!("4 5")])
        .hop(ResourceIdentity::class_level("Route::Math"), "sum", vec![])
        .call_async()
        .unwrap();
    assert_eq!(future.value(WAIT).unwrap(), json!(9));
    drop(future);
    assert_eq!(f.store.key_count().unwrap(), baseline);

    f.parser
        .route("parse", vec![json!("7")])
        .then(&f.math, "sum", vec![])
        .send()
        .unwrap();
    wait_for_baseline(&f.store, baseline);
}

#[test]
fn unknown_destinations_time_out_cleanly() {
    let f = fixture();
    let baseline = f.store.key_count().unwrap();

    let err = Route::new(&f.store)
        .with_options(ProxyOptions::with_timeout(Duration::from_millis(50)))
        .hop(ResourceIdentity::new("Route::Nowhere", "x"), "noop", vec![])
        .call()
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout { .. }));
    assert_eq!(f.store.key_count().unwrap(), baseline);
}
