//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` seeded from
//! `RUST_LOG` plus the configured level, and a JSON or plain-text formatter.
//!
//! Library code only emits events. Embedding applications call
//! [`init_logging`] once at startup, or install their own subscriber.

use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::error::{PersistError, PersistResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Parse a configured level name
pub fn parse_level(level: &str) -> PersistResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(PersistError::config(format!("Invalid log level: {}", other))),
    }
}

/// Install the global subscriber
///
/// A subscriber that is already installed (by an earlier call or by the host
/// application) is left in place.
pub fn init_logging(config: &LogConfig) -> PersistResult<()> {
    let level = parse_level(&config.level)?;
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let installed = match config.format {
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if installed.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
        return Ok(());
    }

    info!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}
