//! Several dispatchers racing on one pending list.

use proptest::prelude::*;
use remora_resource::resource;
use remora_rpc::{Dispatcher, Proxy, ProxyOptions};
use remora_store::Store;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Ledger {
    claims: Mutex<Vec<u64>>,
}

#[resource(class = "Race::Ledger", name = "name")]
impl Ledger {
    #[remote]
    pub fn claim(&self, id: u64) {
        self.claims.lock().unwrap().push(id);
    }

    #[local_attribute]
    pub fn name(&self) -> &'static str {
        "shared"
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn every_token_is_claimed_exactly_once(workers in 1usize..5, tokens in 1u64..40) {
        let store = Store::memory();
        let ledgers: Vec<Arc<Ledger>> = (0..workers)
            .map(|_| Arc::new(Ledger { claims: Mutex::new(Vec::new()) }))
            .collect();
        let mut dispatchers: Vec<Dispatcher> = ledgers
            .iter()
            .map(|ledger| {
                let mut dispatcher = Dispatcher::new(&store, ledger.clone()).unwrap();
                dispatcher.start().unwrap();
                dispatcher
            })
            .collect();

        let proxy = Proxy::new(&store, "Race::Ledger", "shared")
            .unwrap()
            .with_options(ProxyOptions::with_timeout(Duration::from_secs(5)));
        let mut futures: Vec<_> = (0..tokens)
            .map(|id| proxy.call_async("claim", vec![json!(id)]).unwrap())
            .collect();
        for future in &mut futures {
            future.value(Duration::from_secs(5)).unwrap();
        }

        for dispatcher in &mut dispatchers {
            dispatcher.stop().unwrap();
        }

        let mut claimed: Vec<u64> = ledgers
            .iter()
            .flat_map(|ledger| ledger.claims.lock().unwrap().clone())
            .collect();
        prop_assert_eq!(claimed.len() as u64, tokens);
        claimed.sort_unstable();
        prop_assert_eq!(claimed, (0..tokens).collect::<Vec<_>>());
    }
}
