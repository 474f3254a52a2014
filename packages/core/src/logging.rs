//! Tracing subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise `default_directive` applies.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber; later calls are no-ops
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
    {
        tracing::debug!("Tracing initialised");
    }
}
