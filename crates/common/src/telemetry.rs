//! Telemetry and observability initialization for the Lowdeck runtime.
//!
//! Installs a `tracing` subscriber with an environment-driven filter. Query
//! executions log at `info`, resolution internals at `debug`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`; safe to call once per process. Returns an error string
/// when a subscriber is already installed (tests install their own).
pub fn init_tracing() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| e.to_string())
}
