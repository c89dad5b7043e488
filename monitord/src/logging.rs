//! Logging setup for the daemon
//!
//! Log events go to stderr so stdout carries nothing but payload lines.

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Env var holding a full `EnvFilter` directive. Overrides `--log-level`.
pub const LOG_ENV: &str = "TRAJJA_LOG";

/// Output format for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Single-line human readable output
    Compact,
    /// One JSON object per event
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },
}

/// Install the global subscriber.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = create_env_filter(std::env::var(LOG_ENV).ok().as_deref(), default_level)?;

    match format {
        LogFormat::Compact => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .compact(),
            )
            .with(filter)
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(false),
            )
            .with(filter)
            .try_init(),
    }
    .map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// The env directive wins when present and non-empty.
fn create_env_filter(env: Option<&str>, default_level: &str) -> Result<EnvFilter, LoggingError> {
    let directive = match env {
        Some(value) if !value.trim().is_empty() => value,
        _ => default_level,
    };

    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}
