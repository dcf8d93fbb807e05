//! Smoke test against a real Redis server.
//!
//! Run with `REMORA_REDIS_HOST` set and `--ignored`.

use remora_resource::resource;
use remora_rpc::{Discovery, Dispatcher, ProxyOptions};
use remora_store::Store;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Echo;

#[resource(class = "Smoke::Echo")]
impl Echo {
    #[remote]
    pub fn echo(&self, value: serde_json::Value) -> serde_json::Value {
        value
    }
}

#[test]
#[ignore = "needs a Redis server at REMORA_REDIS_HOST"]
fn round_trip_through_redis() {
    let store = Store::from_env().unwrap();
    let mut dispatcher = Dispatcher::new(&store, Arc::new(Echo)).unwrap();
    dispatcher.start().unwrap();

    let echo = Discovery::new(&store)
        .with_options(ProxyOptions::with_timeout(Duration::from_secs(5)))
        .any("Smoke::Echo")
        .unwrap()
        .unwrap();
    let payload = json!({ "nested": [1, "two", null] });
    assert_eq!(echo.call("echo", vec![payload.clone()]).unwrap(), payload);

    let mut future = echo.call_async("echo", vec![json!(7)]).unwrap();
    assert_eq!(future.value(Duration::from_secs(5)).unwrap(), json!(7));

    dispatcher.stop().unwrap();
}
