//! Tracing subscriber setup.
//!
//! Output goes to stderr. `RUST_LOG` wins over the configured level when set.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Call once at startup; later calls are no-ops. `json` switches from the
/// compact human format to one JSON object per line.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails only when a subscriber is already installed.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
