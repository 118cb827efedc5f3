#![forbid(unsafe_code)]

//! Diagnostics emitted by the codec, captured with a tracing layer.

use std::sync::{Arc, Mutex};

use rdt_codec::{EncodedValue, StorePatch, StoreRefMap, apply_store_patch, decode};
use serde_json::json;
use tracing::Subscriber;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Debug, Clone, Default)]
struct Captured {
    level: String,
    message: String,
    fields: Vec<(String, String)>,
}

struct CodecTraceCapture {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl<S> Layer<S> for CodecTraceCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        struct Visitor(Captured);
        impl tracing::field::Visit for Visitor {
            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                if field.name() == "message" {
                    self.0.message = value.to_string();
                } else {
                    self.0.fields.push((field.name().to_string(), value.to_string()));
                }
            }

            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                let text = format!("{value:?}").trim_matches('"').to_string();
                if field.name() == "message" {
                    self.0.message = text;
                } else {
                    self.0.fields.push((field.name().to_string(), text));
                }
            }
        }
        let mut visitor = Visitor(Captured {
            level: event.metadata().level().to_string(),
            ..Captured::default()
        });
        event.record(&mut visitor);
        self.events.lock().expect("codec trace lock").push(visitor.0);
    }
}

fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<Captured>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(CodecTraceCapture {
        events: Arc::clone(&events),
    });
    let out = tracing::subscriber::with_default(subscriber, f);
    let events = events.lock().expect("codec trace lock").clone();
    (out, events)
}

fn field<'a>(event: &'a Captured, name: &str) -> Option<&'a str> {
    event
        .fields
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[test]
fn dropped_store_patch_is_logged_with_store_id() {
    let patch: StorePatch = serde_json::from_value(json!({
        "storeId": "missing",
        "path": ["a"],
        "property": "b",
        "value": [["number", 1]]
    }))
    .expect("patch");
    let mut stores = StoreRefMap::new();

    let (result, events) = capture(|| apply_store_patch(&patch, &mut stores));

    assert!(result.is_err());
    let warn = events
        .iter()
        .find(|e| e.message == "store patch dropped")
        .expect("warning emitted");
    assert_eq!(warn.level, "WARN");
    assert_eq!(field(warn, "store_id"), Some("missing"));
}

#[test]
fn store_eviction_is_logged() {
    let list: Vec<EncodedValue> =
        serde_json::from_value(json!([["store", "s9:1"], ["null", null]])).expect("list");
    let mut stores = StoreRefMap::new();

    let (_, events) = capture(|| {
        let held = decode(&list, None, &mut stores).expect("decode");
        stores.release_and_sweep(&held)
    });

    let evicted = events
        .iter()
        .find(|e| e.message == "store cell evicted")
        .expect("eviction event");
    assert_eq!(evicted.level, "DEBUG");
    assert_eq!(field(evicted, "store_id"), Some("s9"));
}
