//! Structured logging bootstrap.
//!
//! Library crates only emit `tracing` events; binaries call one of these once.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

fn filter_or(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize human-readable logging.
///
/// `RUST_LOG` wins over `default_level` when set.
///
/// # Example
/// ```no_run
/// use fuelwatch_core::logging;
///
/// logging::init("info");
/// tracing::info!("Engine started");
/// ```
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter_or(default_level))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize JSON logging for log aggregation.
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(filter_or(default_level))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize logging as described by `config`.
pub fn init_from_config(config: &LoggingConfig) {
    match config.format {
        LogFormat::Pretty => init(&config.level),
        LogFormat::Json => init_json(&config.level),
    }
}
