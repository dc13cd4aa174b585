//! Telemetry errors.

use thiserror::Error;

/// Result type for telemetry setup.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised while installing the global subscriber.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already installed.
    #[error("subscriber already set: {0}")]
    SubscriberAlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// `LOG_FORMAT` holds an unsupported value.
    #[error("invalid log format: {0}")]
    InvalidFormat(String),
}
