//! Optional `tracing` subscriber setup for applications without their own.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a compact fmt subscriber.
///
/// `RUST_LOG` wins over `directive`; an unparsable `directive` falls back to
/// `warn`. Returns `false` when a global subscriber was already installed.
pub fn init_logging(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init()
        .is_ok()
}

/// [`init_logging`] with the level from the loaded settings.
pub fn init_logging_from_settings() -> bool {
    init_logging(&recital_settings::get_settings().logging.level)
}
