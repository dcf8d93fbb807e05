//! Integration tests for registration and instance counts.

use core::ops::ControlFlow;
use remora_registry::{EventKind, Registry, RegistryEvent};
use remora_resource::resource;
use remora_store::{ResourceIdentity, Store};
use serde_json::{Value, json};
use std::sync::mpsc;
use std::thread;

// ─────────────────────────────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────────────────────────────

struct Shape {
    name: String,
}

#[resource(class = "Demo::Shape", name = "name", reader(area))]
impl Shape {
    #[remote]
    pub fn scale(&self, factor: f64) -> f64 {
        factor
    }

    #[local_attribute]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    #[params]
    fn init(&self) -> Value {
        json!({ "name": self.name })
    }
}

/// Same class, one more remote method.
struct ShapeV2 {
    name: String,
}

#[resource(class = "Demo::Shape", name = "name", reader(area))]
impl ShapeV2 {
    #[remote]
    pub fn scale(&self, factor: f64) -> f64 {
        factor
    }

    #[remote]
    pub fn rotate(&self, degrees: f64) -> f64 {
        degrees
    }

    #[local_attribute]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    #[params]
    fn init(&self) -> Value {
        json!({ "name": self.name })
    }
}

fn shape(name: &str) -> Shape {
    Shape { name: name.into() }
}

/// Records registry events of the shape class until `stop` is published.
fn record_events(store: &Store) -> (thread::JoinHandle<Vec<RegistryEvent>>, String) {
    record_channel(store, RegistryEvent::class_channel("demo-shape"))
}

/// Records registry events on `channel` until `stop` is published.
fn record_channel(
    store: &Store,
    channel: String,
) -> (thread::JoinHandle<Vec<RegistryEvent>>, String) {
    let stop = format!("{channel}.test-stop");
    let (ready_tx, ready_rx) = mpsc::channel();
    let mut conn = store.connect().unwrap();
    let stop_channel = stop.clone();

    let handle = thread::spawn(move || {
        let mut events = Vec::new();
        conn.listen(
            &[channel, stop_channel.clone()],
            &mut || ready_tx.send(()).unwrap(),
            &mut |msg| {
                if msg.channel == stop_channel {
                    return ControlFlow::Break(());
                }
                events.push(RegistryEvent::decode(&msg.payload).unwrap());
                ControlFlow::Continue(())
            },
        )
        .unwrap();
        events
    });
    ready_rx.recv().unwrap();
    (handle, stop)
}

fn kinds(events: &[RegistryEvent]) -> Vec<EventKind> {
    events.iter().map(|e| e.event).collect()
}

// ─────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────

#[test]
fn register_writes_capabilities_and_instance_entry() {
    let store = Store::memory();
    let registry = Registry::new(&store);

    let registration = registry.register(&shape("Circle")).unwrap();
    assert_eq!(registration.identity, ResourceIdentity::new("Demo::Shape", "circle"));
    assert_eq!(registration.event, Some(EventKind::Created));

    let mut client = store.client(registration.identity.clone()).unwrap();
    assert_eq!(client.registered_methods().unwrap()["scale"], "1");
    assert_eq!(client.registered_attributes().unwrap()["area"], "r");
    assert_eq!(registry.instances("demo-shape").unwrap()["circle"], 0);

    let params = client
        .connection()
        .get(&registration.identity.keys().params())
        .unwrap()
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&params).unwrap(), json!({ "name": "Circle" }));
}

#[test]
fn second_registration_writes_nothing_and_publishes_nothing() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    registry.register(&shape("square")).unwrap();

    let (events, stop) = record_events(&store);
    let keys_before = store.key_count().unwrap();
    let again = registry.register(&shape("square")).unwrap();
    assert!(!again.changed());
    assert_eq!(store.key_count().unwrap(), keys_before);

    store.connect().unwrap().publish(&stop, "").unwrap();
    assert!(events.join().unwrap().is_empty());
}

#[test]
fn changed_capabilities_publish_updated() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    let (events, stop) = record_events(&store);

    registry.register(&shape("hex")).unwrap();
    let update = registry
        .register(&ShapeV2 { name: "hex".into() })
        .unwrap();
    assert_eq!(update.event, Some(EventKind::Updated));

    let mut client = store.client(update.identity.clone()).unwrap();
    assert_eq!(client.registered_methods().unwrap().len(), 2);

    store.connect().unwrap().publish(&stop, "").unwrap();
    assert_eq!(
        kinds(&events.join().unwrap()),
        vec![EventKind::Created, EventKind::Updated]
    );
}

#[test]
fn instance_channels_carry_only_their_instance() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    let circle = ResourceIdentity::new("Demo::Shape", "circle");
    let (events, stop) = record_channel(&store, RegistryEvent::channel(&circle));

    registry.register(&shape("square")).unwrap();
    registry.register(&shape("circle")).unwrap();
    registry.start_instance(&circle).unwrap();
    registry.stop_instance(&circle).unwrap();
    registry.unregister(&shape("circle")).unwrap();

    store.connect().unwrap().publish(&stop, "").unwrap();
    let events = events.join().unwrap();
    assert!(events.iter().all(|event| event.resource == circle));
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Created,
            EventKind::Started,
            EventKind::Stopped,
            EventKind::Removed
        ]
    );
}

#[test]
fn concurrent_registrations_keep_every_instance() {
    let store = Store::memory();
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                Registry::new(&store)
                    .register(&shape(&format!("s{i}")))
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let instances = Registry::new(&store).instances("demo-shape").unwrap();
    assert_eq!(instances.len(), 8);
    assert!(instances.values().all(|count| *count == 0));
}

#[test]
fn unregister_removes_entry_and_params() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    let circle = shape("circle");
    let identity = registry.register(&circle).unwrap().identity;

    assert!(registry.unregister(&circle).unwrap());
    assert!(!registry.unregister(&circle).unwrap());
    assert!(registry.instances("demo-shape").unwrap().is_empty());
    assert!(!store.connect().unwrap().exists(&identity.keys().params()).unwrap());
}

// ─────────────────────────────────────────────────────────────────────
// Instance counts
// ─────────────────────────────────────────────────────────────────────

#[test]
fn start_and_stop_track_live_count() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    let identity = registry.register(&shape("tri")).unwrap().identity;
    let (events, stop) = record_events(&store);

    assert_eq!(registry.start_instance(&identity).unwrap(), 1);
    assert_eq!(registry.start_instance(&identity).unwrap(), 2);
    assert_eq!(registry.live_instances("demo-shape").unwrap(), vec!["tri"]);

    assert_eq!(registry.stop_instance(&identity).unwrap(), 1);
    assert_eq!(registry.stop_instance(&identity).unwrap(), 0);
    assert_eq!(registry.stop_instance(&identity).unwrap(), 0);
    assert!(registry.live_instances("demo-shape").unwrap().is_empty());
    // Still known, just not callable.
    assert_eq!(registry.instances("demo-shape").unwrap()["tri"], 0);

    store.connect().unwrap().publish(&stop, "").unwrap();
    assert_eq!(
        kinds(&events.join().unwrap()),
        vec![
            EventKind::Started,
            EventKind::Started,
            EventKind::Stopped,
            EventKind::Stopped
        ]
    );
}

#[test]
fn live_instances_are_sorted() {
    let store = Store::memory();
    let registry = Registry::new(&store);
    for name in ["zeta", "alpha", "mid"] {
        let identity = registry.register(&shape(name)).unwrap().identity;
        registry.start_instance(&identity).unwrap();
    }
    assert_eq!(
        registry.live_instances("demo-shape").unwrap(),
        vec!["alpha", "mid", "zeta"]
    );
}
