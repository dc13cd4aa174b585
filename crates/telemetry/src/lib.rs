//! Structured logging setup shared by the workspace binaries and tests.
//!
//! Provides:
//! - JSON (bunyan-style) or pretty terminal output, always on stderr
//! - `log` crate records forwarded into `tracing`
//! - A quiet subscriber for tests
//!
//! Stdout is left alone so binaries can print machine-readable results.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! telemetry::init_default("automl-eval");
//! tracing::info!("Application started");
//! ```
//!
//! # Configuration
//!
//! Environment variables:
//! - `RUST_LOG` - Log filter directive (default: "info")
//! - `LOG_FORMAT` - Output format: "json" or "pretty" (default: "pretty")
//! - `TEST_LOG` - If set, enables logs in test mode

pub mod config;
pub mod error;
pub mod layers;

pub use config::{DEFAULT_FILTER, LogFormat, TelemetryConfig};
pub use error::{Result, TelemetryError};

pub use tracing::{debug, error, info, trace, warn};

use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Initialize telemetry from environment variables.
///
/// Setup failures (for example a subscriber that is already installed)
/// are reported on stderr and otherwise ignored.
pub fn init_default(name: &str) {
    init_with_config(name, TelemetryConfig::from_env());
}

/// Initialize telemetry with a custom default filter.
///
/// `RUST_LOG` still wins when set.
pub fn init_with_filter(name: &str, default_filter: &str) {
    init_with_config(name, TelemetryConfig::from_env().with_filter(default_filter));
}

/// Initialize telemetry with full configuration control.
///
/// ```rust,no_run
/// use telemetry::{LogFormat, TelemetryConfig};
///
/// let config = TelemetryConfig::new()
///     .with_filter("debug")
///     .with_format(LogFormat::Json);
///
/// telemetry::init_with_config("automl-eval", config);
/// ```
pub fn init_with_config(name: &str, config: TelemetryConfig) {
    if let Err(err) = try_init_with_config(name, config) {
        eprintln!("telemetry disabled: {}", err);
    }
}

/// Install the global subscriber described by `config`.
pub fn try_init_with_config(name: &str, config: TelemetryConfig) -> Result<()> {
    let _ = LogTracer::init();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    match config.format {
        LogFormat::Json => {
            let (storage_layer, formatting_layer) =
                layers::JsonLayer::layers(name, std::io::stderr);
            let subscriber = Registry::default()
                .with(env_filter)
                .with(storage_layer)
                .with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Pretty => {
            let formatting_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false);
            let subscriber = Registry::default().with(env_filter).with(formatting_layer);
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Initialize telemetry for tests.
///
/// Logs are suppressed unless `TEST_LOG` is set. Safe to call from every
/// test; only the first call installs a subscriber.
pub fn init_test() {
    let config = TelemetryConfig::from_env().with_test_mode(true);
    if config.should_suppress_logs() {
        return;
    }

    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = LogTracer::init();

        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));
        let formatting_layer = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_test_writer();
        let subscriber = Registry::default().with(env_filter).with(formatting_layer);

        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}
