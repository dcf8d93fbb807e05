//! Smoke tests against a live Redis server.
//!
//! Ignored by default. Run with `REMORA_REDIS_HOST` (and friends) pointing at
//! a scratch database:
//!
//! ```text
//! REMORA_REDIS_HOST=127.0.0.1 REMORA_REDIS_DB=15 cargo test -p remora_store -- --ignored
//! ```

use core::ops::ControlFlow;
use remora_store::{Store, WriteOp};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn store() -> Store {
    Store::from_env().expect("REMORA_REDIS_HOST must point at a scratch Redis database")
}

fn scratch(name: &str) -> String {
    format!("remora-smoke.{}.{name}", std::process::id())
}

#[test]
#[ignore = "requires a Redis server"]
fn blmove_moves_between_lists() {
    let store = store();
    let mut conn = store.connect().unwrap();
    let (src, dst) = (scratch("src"), scratch("dst"));

    conn.rpush(&src, "t1").unwrap();
    let moved = conn.blmove(&src, &dst, Duration::from_secs(1)).unwrap();
    assert_eq!(moved.as_deref(), Some("t1"));
    assert_eq!(conn.lrange(&dst).unwrap(), vec!["t1".to_string()]);
    assert!(!conn.exists(&src).unwrap());

    conn.del(&dst).unwrap();
}

#[test]
#[ignore = "requires a Redis server"]
fn exec_aborts_after_concurrent_write() {
    let store = store();
    let mut a = store.connect().unwrap();
    let mut b = store.connect().unwrap();
    let key = scratch("watched");

    a.set(&key, "1", None).unwrap();
    a.watch(&[key.clone()]).unwrap();
    b.set(&key, "2", None).unwrap();
    assert!(!a.exec(&[WriteOp::set(&key, "3")]).unwrap());

    a.watch(&[key.clone()]).unwrap();
    assert!(a.exec(&[WriteOp::set(&key, "4")]).unwrap());
    assert_eq!(a.get(&key).unwrap().as_deref(), Some("4"));

    a.del(&key).unwrap();
}

#[test]
#[ignore = "requires a Redis server"]
fn listen_until_stop_channel() {
    let store = store();
    let channel = scratch("events");
    let stop = scratch("stop");
    let (ready_tx, ready_rx) = mpsc::channel();

    let listener = {
        let store = store.clone();
        let channels = vec![channel.clone(), stop.clone()];
        thread::spawn(move || {
            let mut seen = Vec::new();
            store
                .connect()
                .unwrap()
                .listen(
                    &channels,
                    &mut || ready_tx.send(()).unwrap(),
                    &mut |msg| {
                        if msg.channel == channels[1] {
                            return ControlFlow::Break(());
                        }
                        seen.push(msg.payload);
                        ControlFlow::Continue(())
                    },
                )
                .unwrap();
            seen
        })
    };

    ready_rx.recv().unwrap();
    let mut conn = store.connect().unwrap();
    conn.publish(&channel, "hello").unwrap();
    conn.publish(&stop, "").unwrap();

    assert_eq!(listener.join().unwrap(), vec!["hello".to_string()]);
}
