use std::io;

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogConfig, LogFormat};

const DEFAULT_FILTER: &str = "info,sqlx=warn";
const VERBOSE_FILTER: &str = "debug,sqlx=info";

/// Pick the filter directives: `RUST_LOG`, then the configured filter,
/// then the built-in default.
fn env_filter(config: &LogConfig, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let fallback = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
        EnvFilter::new(config.filter.as_deref().unwrap_or(fallback))
    })
}

/// Install the global tracing subscriber. Later calls are ignored.
///
/// Logs go to stderr so that command output on stdout stays parseable.
pub fn init(config: &LogConfig, verbose: bool) {
    let filter = env_filter(config, verbose);
    let builder = fmt().with_env_filter(filter).with_writer(io::stderr);
    let _ = match config.format {
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
