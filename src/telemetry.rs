//! Logging setup
//!
//! The library only emits `tracing` events; binaries and tests that want to
//! see them call [`init_tracing`] once.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"info"` or `"bosscore=debug"`).
///
/// Returns `false` if a global subscriber was already installed; calling this
/// more than once is harmless.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
