//! Shared test harness: tracing initialization driven by `RUST_LOG`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install the env-filter tracing subscriber once per test binary.
///
/// Verbosity comes from the environment, e.g.
/// `RUST_LOG=vtsched=trace cargo test -- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
