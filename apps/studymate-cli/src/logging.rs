use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};

/// Filter directive: `RUST_LOG` if set, otherwise the configured level raised
/// by `-v` (info), `-vv` (debug) or `-vvv` (trace).
fn filter(config: &LoggingConfig, verbose: u8) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match verbose {
        0 => config.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("invalid log level '{level}' ({e}), falling back to warn");
        EnvFilter::new("warn")
    })
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean for
/// response bodies.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let registry = tracing_subscriber::registry().with(filter(config, verbose));
    let result = match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init(),
    };
    result.context("failed to initialise logging")
}
