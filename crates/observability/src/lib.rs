//! Shared tracing setup for stocklot tests, benches, and binaries.

use tracing_subscriber::EnvFilter;

/// Initialize process-wide logging.
///
/// Filtering follows `RUST_LOG` when set and defaults to `info`. Safe to
/// call more than once; only the first call installs a subscriber.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with an explicit fallback filter for when `RUST_LOG` is
/// unset. Tests and benches use this to quiet or focus specific targets.
pub fn init_with_default(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // JSON logs + timestamps, configurable via RUST_LOG.
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("logging initialized");
    }
}
