//! Logging setup for the binary. The library only emits `tracing` events.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ghg_ledger=info";

/// Install a fmt subscriber filtered by `RUST_LOG`. Safe to call twice; the
/// second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
