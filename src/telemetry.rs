//! Tracing subscriber initialisation for binaries.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "coda=info";

/// Installs a formatted subscriber filtered by `RUST_LOG`.
///
/// Logs go to standard error so command output on standard output stays
/// machine-readable. Calling this twice is harmless; the second call leaves
/// the first subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
    if let Err(error) = installed {
        tracing::debug!(%error, "tracing subscriber already installed");
    }
}
