//! Error types for automl-eval.

use thiserror::Error;

/// Result type for automl-eval operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while building, fitting or scoring a pipeline.
///
/// None of these cross the evaluator boundary: the evaluator turns every
/// variant into a [`ResultRecord`](crate::ResultRecord) with a diagnostic.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Invalid or incompatible hyperparameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Dataset shape or content is unusable for the task.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Failure while fitting the pipeline.
    #[error("fit error: {0}")]
    Fit(String),

    /// Failure while predicting.
    #[error("predict error: {0}")]
    Predict(String),

    /// A metric could not be computed from the predictions.
    #[error("metric error: {0}")]
    Metric(String),

    /// The optimization loss was NaN or infinite.
    #[error("non-finite loss for metric {metric}: {value}")]
    NonFiniteLoss { metric: String, value: f64 },

    /// Metric name is not registered.
    #[error("unknown metric: {0}")]
    UnknownMetric(String),

    /// Backend failed to store predictions.
    #[error("backend error: {0}")]
    Backend(String),

    /// Settings could not be parsed.
    #[error("settings error: {0}")]
    Settings(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EvalError {
    /// Short diagnostic for the `run_info` field of a crash record.
    pub fn diagnostic(&self) -> String {
        let kind = match self {
            Self::Configuration(_) => "configuration",
            Self::Dataset(_) => "dataset",
            Self::Fit(_) => "fit",
            Self::Predict(_) => "predict",
            Self::Metric(_) | Self::UnknownMetric(_) => "metric",
            Self::NonFiniteLoss { .. } => "non_finite_loss",
            Self::Backend(_) | Self::Io(_) | Self::Json(_) => "backend",
            Self::Settings(_) | Self::Toml(_) => "settings",
        };
        format!("{}: {}", kind, self)
    }
}

/// Errors seen by the reading side of a result channel.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// No record arrived within the timeout.
    #[error("no result within {0:?}")]
    Timeout(std::time::Duration),

    /// The producer went away without writing a record.
    #[error("result producer disconnected without writing a record")]
    Disconnected,

    /// The reader went away before the record was written.
    #[error("result reader disconnected")]
    ReaderGone,
}
