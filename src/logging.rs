/// Structured logging setup using tracing
///
/// Writes to stderr only: stdout carries the JSON payloads printed by the CLI.
/// Human-readable with ANSI colors when stderr is a terminal, structured JSON
/// when piped/redirected.

use std::io::IsTerminal;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use crate::config::Config;

/// Initialize tracing subscriber with stderr-only output
///
/// Log level from config.log_level (default: info).
/// RUST_LOG env var can override at runtime.
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init_logging(config: &Config) {
    init_with_level(&config.log_level);
}

/// Initialize logging from a bare level string (used by the benchmark binary).
pub fn init_with_level(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let result = if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
            )
            .try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
