use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Initializes the global `tracing` subscriber. `debug_logging` raises the
/// default level from `info` to `debug`; `RUST_LOG` can still narrow or widen
/// individual targets on top of that default.
pub fn init_tracer(debug_logging: bool) {
    let default_level = if debug_logging { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(filter)
        .init();
}
