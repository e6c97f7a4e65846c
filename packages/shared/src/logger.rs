//! Logging setup for the Chatter binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// Enables logging for the engine crates and the calling binary. The filter can be
/// overridden with the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "chatter-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn")
///
/// # Examples
///
/// ```no_run
/// use chatter_shared::logger::setup_logger;
///
/// setup_logger("chatter-server", "info");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Logger initialized for '{}'", binary_name);
}

/// Build the directive string used when `RUST_LOG` is not set.
fn default_filter(binary_name: &str, level: &str) -> String {
    format!(
        "chatter_shared={level},chatter_server={level},{}={level},tower_http={level}",
        binary_name.replace('-', "_"),
    )
}
