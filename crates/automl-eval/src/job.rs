//! JSON job files for the command-line runner.
//!
//! ```json
//! {
//!   "name": "iris",
//!   "task": "multiclass_classification",
//!   "train": { "x": [[5.1, 3.5], [4.9, 3.0]], "y": [0, 1] },
//!   "config": { "estimator": "knn", "n_neighbors": 3 },
//!   "all_scoring_functions": true
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, FileBackend, NoopBackend};
use crate::configuration::Configuration;
use crate::dataset::{Dataset, Labels, Split};
use crate::error::{EvalError, Result};
use crate::evaluator::EvalRequest;
use crate::metrics::MetricRegistry;
use crate::task::TaskType;

/// Labels as written in a job file: a flat list or one row per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelRows {
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRows {
    pub x: Vec<Vec<f64>>,
    pub y: LabelRows,
}

/// One evaluation described in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalJob {
    pub name: String,
    pub task: TaskType,
    pub train: SplitRows,
    #[serde(default)]
    pub test: Option<SplitRows>,
    #[serde(default)]
    pub config: Configuration,
    /// Metric to optimize; the task's default when absent.
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_num_run")]
    pub num_run: i64,
    #[serde(default)]
    pub subsample: Option<usize>,
    #[serde(default)]
    pub all_scoring_functions: bool,
    #[serde(default)]
    pub output_y_hat_optimization: bool,
    #[serde(default)]
    pub include: Option<Vec<String>>,
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
    #[serde(default)]
    pub disable_file_output: bool,
    #[serde(default)]
    pub instance: Option<String>,
    /// Where predictions are written. Nothing is written when absent.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

fn default_seed() -> u64 {
    1
}

fn default_num_run() -> i64 {
    1
}

impl EvalJob {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Build the dataset described by the job.
    pub fn dataset(&self) -> Result<Dataset> {
        let data = Dataset::new(&self.name, self.task, split(&self.train)?)?;
        match &self.test {
            Some(test) => data.with_test(split(test)?),
            None => Ok(data),
        }
    }

    /// Build the evaluation request, resolving the metric through `registry`.
    pub fn request(&self, registry: &MetricRegistry) -> Result<EvalRequest> {
        let data = Arc::new(self.dataset()?);
        let metric = match &self.metric {
            Some(name) => registry.lookup(name)?,
            None => registry.default_for(self.task)?,
        };
        if !metric.applies_to(self.task) {
            return Err(EvalError::Metric(format!(
                "metric {} does not apply to {}",
                metric.name(),
                self.task
            )));
        }

        let mut request = EvalRequest::new(Arc::new(self.config.clone()), data, metric.clone())
            .seed(self.seed)
            .num_run(self.num_run)
            .all_scoring_functions(self.all_scoring_functions)
            .output_y_hat_optimization(self.output_y_hat_optimization)
            .disable_file_output(self.disable_file_output);
        request.subsample = self.subsample;
        request.include = self.include.clone();
        request.exclude = self.exclude.clone();
        request.instance = self.instance.clone();
        Ok(request)
    }

    /// Backend writing to `output_dir`, or one discarding everything.
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        Ok(match &self.output_dir {
            Some(dir) => Arc::new(FileBackend::new(dir)?),
            None => Arc::new(NoopBackend),
        })
    }
}

fn split(rows: &SplitRows) -> Result<Split> {
    let y = match &rows.y {
        LabelRows::Vector(values) => Labels::Vector(Array1::from(values.clone())),
        LabelRows::Matrix(values) => Labels::Matrix(matrix(values)?),
    };
    Split::new(matrix(&rows.x)?, y)
}

fn matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let width = rows.first().map_or(0, Vec::len);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(EvalError::Dataset(format!(
            "row {} has {} columns, expected {}",
            i,
            row.len(),
            width
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| EvalError::Dataset(e.to_string()))
}
