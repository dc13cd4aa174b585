//! Result records emitted once per evaluation.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Loss reported for runs that did not produce a usable score.
pub const WORST_POSSIBLE_RESULT: f64 = 2147483647.0;

/// Key of the duration entry in a [`ScoreReport`].
pub const DURATION_KEY: &str = "duration";

/// Key of the run identifier entry in a [`ScoreReport`].
pub const NUM_RUN_KEY: &str = "num_run";

/// Completion status of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Fitted, predicted and scored; `result` is finite.
    Success,
    /// Ran to completion but produced an unusable score.
    Failure,
    /// An error or panic stopped the evaluation.
    Crashed,
    /// No record arrived in time. Only produced on the reading side.
    Timeout,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "SUCCESS",
            Status::Failure => "FAILURE",
            Status::Crashed => "CRASHED",
            Status::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Ordered `name:value` entries of the all-metrics mode.
///
/// Wire form is `name:value;name:value`. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    entries: Vec<(String, f64)>,
}

impl ScoreReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an entry, replacing any previous value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}:{}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for ScoreReport {
    type Err = EvalError;

    /// Split on `;`, then on the first `:` of each token.
    fn from_str(s: &str) -> Result<Self> {
        let mut report = ScoreReport::new();
        for token in s.split(';').filter(|t| !t.is_empty()) {
            let (name, value) = token
                .split_once(':')
                .ok_or_else(|| EvalError::Metric(format!("malformed score entry: {}", token)))?;
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| EvalError::Metric(format!("malformed score value: {}", token)))?;
            if report.get(name).is_some() {
                return Err(EvalError::Metric(format!("duplicate score key: {}", name)));
            }
            report.entries.push((name.to_string(), value));
        }
        Ok(report)
    }
}

/// Auxiliary payload of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunInfo {
    /// Only the optimization loss was computed.
    Loss(f64),
    /// All applicable metrics plus duration and run identifier.
    Scores(ScoreReport),
    /// What went wrong.
    Diagnostic(String),
}

impl RunInfo {
    pub fn scores(&self) -> Option<&ScoreReport> {
        match self {
            RunInfo::Scores(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunInfo::Loss(loss) => write!(f, "{}", loss),
            RunInfo::Scores(report) => write!(f, "{}", report),
            RunInfo::Diagnostic(message) => f.write_str(message),
        }
    }
}

/// One evaluation outcome: `(duration, result, seed, run_info, status)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Wall-clock seconds spent on build, fit, predict and score.
    pub duration: f64,
    /// Loss of the optimization metric, or the worst-possible sentinel.
    pub result: f64,
    /// Seed of the run.
    pub seed: u64,
    pub run_info: RunInfo,
    pub status: Status,
}

impl ResultRecord {
    /// Successful run.
    pub fn success(duration: f64, result: f64, seed: u64, run_info: RunInfo) -> Self {
        Self {
            duration,
            result,
            seed,
            run_info,
            status: Status::Success,
        }
    }

    /// Crashed run with a diagnostic.
    pub fn crashed(duration: f64, worst: f64, seed: u64, diagnostic: impl Into<String>) -> Self {
        Self {
            duration,
            result: worst,
            seed,
            run_info: RunInfo::Diagnostic(diagnostic.into()),
            status: Status::Crashed,
        }
    }

    /// Run that finished without a usable score.
    pub fn failure(duration: f64, worst: f64, seed: u64, diagnostic: impl Into<String>) -> Self {
        Self {
            duration,
            result: worst,
            seed,
            run_info: RunInfo::Diagnostic(diagnostic.into()),
            status: Status::Failure,
        }
    }

    /// Record a reader can log when no record arrived within `limit`.
    pub fn timeout(limit: Duration, worst: f64, seed: u64) -> Self {
        Self {
            duration: limit.as_secs_f64(),
            result: worst,
            seed,
            run_info: RunInfo::Diagnostic(format!("no result within {:?}", limit)),
            status: Status::Timeout,
        }
    }

    /// Tuple form, matching the order readers unpack.
    pub fn into_tuple(self) -> (f64, f64, u64, RunInfo, Status) {
        (self.duration, self.result, self.seed, self.run_info, self.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
