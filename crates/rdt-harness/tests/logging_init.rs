#![forbid(unsafe_code)]

use rdt_harness::logging::{self, LogConfig, LogFormat, LogInitError};

#[test]
fn global_subscriber_installs_once() {
    let bad = LogConfig::default().with_filter("rdt_router=loud");
    assert!(matches!(logging::init(&bad), Err(LogInitError::Filter(_))));

    let config = LogConfig::default()
        .with_filter("rdt_router=debug,warn")
        .with_format(LogFormat::Json);
    logging::init(&config).expect("first install");
    tracing::info!(subject_key = 7, "logging ready");

    assert!(matches!(
        logging::init(&LogConfig::default()),
        Err(LogInitError::Install(_))
    ));
}
