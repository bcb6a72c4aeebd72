//! Process logging setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "TRELLIS_LOG";

/// Build the filter from `TRELLIS_LOG`, falling back to `default`
/// (for example `"info"` or `"trellis::namespace=debug"`).
pub fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a console subscriber.
///
/// Returns false if a global subscriber was already installed, so tests and
/// binaries may both call it.
pub fn init(default: &str) -> bool {
    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter(default));
    tracing_subscriber::registry().with(console).try_init().is_ok()
}
