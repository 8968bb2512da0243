//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing/telemetry. Loads a `.env` file if present (so
/// `RUST_LOG` and the crate's own env-var knobs can be set outside the
/// shell), then, unless a subscriber is already installed, installs a
/// default env-based one.
pub fn init_tracing() {
    dotenvy::dotenv().ok();
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
