//! Integration tests for attribute change subscriptions.

use remora_attributes::{AttributeStore, Bindings, SubscriberSession};
use remora_resource::Value;
use remora_store::{ResourceIdentity, Store};
use serde_json::json;
use std::sync::mpsc;
use std::time::Duration;

fn recv(rx: &mpsc::Receiver<(String, Value)>) -> (String, Value) {
    rx.recv_timeout(Duration::from_secs(2))
        .expect("no change delivered")
}

#[test]
fn handlers_receive_stripped_keys_and_values() {
    let store = Store::memory();
    let sensor = ResourceIdentity::new("Lab::Sensor", "north");
    let (tx, rx) = mpsc::channel();

    let bindings = Bindings::new()
        .on(&sensor, "temperature", {
            let tx = tx.clone();
            move |key, value| tx.send((key.to_string(), value)).unwrap()
        })
        .on(&sensor, "humidity", move |key, value| {
            tx.send((key.to_string(), value)).unwrap();
        });
    let session = SubscriberSession::start(&store, &sensor, bindings).unwrap();

    let mut attrs = AttributeStore::open(&store, sensor.clone()).unwrap();
    attrs.set("temperature", &19.5).unwrap();
    attrs.set("humidity", &40).unwrap();
    attrs.set("pressure", &1013).unwrap();

    assert_eq!(recv(&rx), ("temperature".to_string(), json!(19.5)));
    assert_eq!(recv(&rx), ("humidity".to_string(), json!(40)));

    session.stop().unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn unchanged_writes_are_not_delivered() {
    let store = Store::memory();
    let light = ResourceIdentity::new("Lamp", "desk");
    let (tx, rx) = mpsc::channel();

    let bindings = Bindings::new().on(&light, "on", move |key, value| {
        tx.send((key.to_string(), value)).unwrap();
    });
    let session = SubscriberSession::start(&store, &light, bindings).unwrap();

    let mut attrs = AttributeStore::open(&store, light.clone()).unwrap();
    attrs.set("on", &true).unwrap();
    attrs.set("on", &true).unwrap();
    attrs.delete("on").unwrap();

    assert_eq!(recv(&rx), ("on".to_string(), json!(true)));
    assert_eq!(recv(&rx), ("on".to_string(), Value::Null));
    session.stop().unwrap();
    assert!(rx.try_recv().is_err());
}

#[test]
fn sessions_of_different_owners_stop_independently() {
    let store = Store::memory();
    let a = ResourceIdentity::new("Watcher", "a");
    let b = ResourceIdentity::new("Watcher", "b");

    let first = SubscriberSession::start(&store, &a, Bindings::new()).unwrap();
    let second = SubscriberSession::start(&store, &b, Bindings::new()).unwrap();

    first.stop().unwrap();
    assert!(second.is_running());
    drop(second);
}
