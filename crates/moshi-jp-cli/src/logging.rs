//! Subscriber setup for both binaries.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Install a compact stderr subscriber at INFO, or DEBUG with `--debug`.
/// `RUST_LOG`, when set, takes precedence.
pub fn init(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
