#![no_main]

use libfuzzer_sys::fuzz_target;
use rdt_mirror::Mirror;
use rdt_protocol::Envelope;

fuzz_target!(|data: &[u8]| {
    let mut mirror = Mirror::new();
    for line in data.split(|b| *b == b'\n').take(32) {
        if let Ok(envelope) = serde_json::from_slice::<Envelope>(line) {
            let _ = mirror.handle_envelope(envelope);
        }
    }
    mirror.reset();
    assert!(mirror.stores().is_empty());
    assert!(mirror.nodes().is_empty());
});
