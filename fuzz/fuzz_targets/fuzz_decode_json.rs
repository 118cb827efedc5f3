#![no_main]

use libfuzzer_sys::fuzz_target;
use rdt_codec::{EncodedValue, StoreRefMap, decode, dispose};

fuzz_target!(|data: &[u8]| {
    let Ok(list) = serde_json::from_slice::<Vec<EncodedValue>>(data) else {
        return;
    };
    let mut stores = StoreRefMap::new();
    let Ok(value) = decode(&list, None, &mut stores) else {
        return;
    };
    let _ = value.to_json();
    stores.release_and_sweep(&value);
    stores.collect_cycles();
    assert!(stores.is_empty());
    dispose(&value);
});
