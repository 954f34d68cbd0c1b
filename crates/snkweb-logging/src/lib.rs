//! # snkweb-logging
//!
//! `tracing` subscriber setup for applications embedding the search client.
//!
//! `RUST_LOG` takes precedence over the configured level, so per-module
//! overrides such as `snkweb::search=trace` work without touching settings.

#![deny(unsafe_code)]

use snkweb_settings::LoggingSettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors from logging initialization.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Build the level filter: `RUST_LOG` if set and valid, otherwise the
/// configured level.
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.as_filter_str()))
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), LoggingError> {
    let filter = build_filter(settings);
    let registry = tracing_subscriber::registry();

    let result = if settings.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_span_list(true)
                    .with_filter(filter),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_filter(filter),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
