//! Evaluator settings.
//!
//! Settings are read from a TOML file and can be overridden with
//! environment variables:
//!
//! - `AUTOML_EVAL_RESULT_TIMEOUT_MS` - how long readers wait for a record
//! - `AUTOML_EVAL_WORST_POSSIBLE_RESULT` - loss reported for failed runs
//! - `AUTOML_EVAL_SUBSAMPLE_POLICY` - `head`, `random` or `stratified`
//!
//! ```toml
//! result_timeout_ms = 5000
//! worst_possible_result = 2147483647.0
//! subsample_policy = "stratified"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::record::WORST_POSSIBLE_RESULT;
use crate::subsample::SubsamplePolicy;

const ENV_RESULT_TIMEOUT_MS: &str = "AUTOML_EVAL_RESULT_TIMEOUT_MS";
const ENV_WORST_POSSIBLE_RESULT: &str = "AUTOML_EVAL_WORST_POSSIBLE_RESULT";
const ENV_SUBSAMPLE_POLICY: &str = "AUTOML_EVAL_SUBSAMPLE_POLICY";

/// Knobs shared by every evaluation a process runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorSettings {
    /// How long a reader waits for a record before declaring a timeout.
    pub result_timeout_ms: u64,
    /// Loss reported by crashed and failed runs.
    pub worst_possible_result: f64,
    /// Row selection when a subsample size is requested.
    pub subsample_policy: SubsamplePolicy,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            result_timeout_ms: 1_000,
            worst_possible_result: WORST_POSSIBLE_RESULT,
            subsample_policy: SubsamplePolicy::Random,
        }
    }
}

impl EvaluatorSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from TOML text. Missing keys take defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)?.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup(ENV_RESULT_TIMEOUT_MS) {
            self.result_timeout_ms = value
                .parse()
                .map_err(|_| invalid(ENV_RESULT_TIMEOUT_MS, &value))?;
        }
        if let Some(value) = lookup(ENV_WORST_POSSIBLE_RESULT) {
            self.worst_possible_result = value
                .parse()
                .map_err(|_| invalid(ENV_WORST_POSSIBLE_RESULT, &value))?;
        }
        if let Some(value) = lookup(ENV_SUBSAMPLE_POLICY) {
            self.subsample_policy = match value.as_str() {
                "head" => SubsamplePolicy::Head,
                "random" => SubsamplePolicy::Random,
                "stratified" => SubsamplePolicy::Stratified,
                _ => return Err(invalid(ENV_SUBSAMPLE_POLICY, &value)),
            };
        }
        Ok(self)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }
}

fn invalid(key: &str, value: &str) -> EvalError {
    EvalError::Settings(format!("invalid value for {}: {}", key, value))
}
