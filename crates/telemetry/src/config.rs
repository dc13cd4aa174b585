//! Telemetry configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::TelemetryError;

/// Default filter directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
const ENV_TEST_LOG: &str = "TEST_LOG";

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Bunyan-style JSON, one object per line.
    Json,
    /// Human-readable terminal output.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(TelemetryError::InvalidFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        })
    }
}

/// How the global subscriber is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// Running under a test harness.
    pub test_mode: bool,
    /// `TEST_LOG` was set.
    pub test_log: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            test_mode: false,
            test_log: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `LOG_FORMAT` and `TEST_LOG` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    ///
    /// An unrecognized `LOG_FORMAT` falls back to pretty output.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let format = lookup(ENV_LOG_FORMAT)
            .and_then(|value| value.parse().ok())
            .unwrap_or_default();
        Self {
            format,
            test_log: lookup(ENV_TEST_LOG).is_some(),
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Tests stay silent unless `TEST_LOG` is set.
    pub fn should_suppress_logs(&self) -> bool {
        self.test_mode && !self.test_log
    }
}
