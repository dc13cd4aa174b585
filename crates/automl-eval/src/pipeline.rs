//! Pipeline construction seam.
//!
//! The evaluator does not know how pipelines are made. It asks a
//! [`PipelineBuilder`] for a [`Pipeline`] and only ever calls `fit` and
//! `predict` on the result.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::configuration::Configuration;
use crate::dataset::Labels;
use crate::error::{EvalError, Result};
use crate::task::TaskType;

/// Model output on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predictions {
    /// Classification: `samples × classes` class probabilities.
    /// Multilabel: `samples × labels` per-label probabilities.
    Probabilities(Array2<f64>),
    /// Regression targets.
    Values(Array1<f64>),
}

impl Predictions {
    /// Number of predicted samples.
    pub fn len(&self) -> usize {
        match self {
            Predictions::Probabilities(p) => p.nrows(),
            Predictions::Values(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hard labels derived from the output.
    ///
    /// Single-label probabilities reduce to the argmax class (lowest index
    /// wins ties), multilabel probabilities are thresholded at 0.5, and
    /// regression values pass through.
    pub fn hard_labels(&self, task: TaskType) -> Result<Labels> {
        match (task, self) {
            (TaskType::Regression, Predictions::Values(v)) => Ok(Labels::Vector(v.clone())),
            (TaskType::MultilabelClassification, Predictions::Probabilities(p)) => {
                Ok(Labels::Matrix(p.mapv(|v| if v >= 0.5 { 1.0 } else { 0.0 })))
            }
            (_, Predictions::Probabilities(p)) if task.is_classification() => {
                let labels = p
                    .axis_iter(Axis(0))
                    .map(|row| {
                        let mut best = 0;
                        for (i, &v) in row.iter().enumerate() {
                            if v > row[best] {
                                best = i;
                            }
                        }
                        best as f64
                    })
                    .collect::<Array1<f64>>();
                Ok(Labels::Vector(labels))
            }
            _ => Err(EvalError::Predict(format!(
                "prediction kind does not match task {}",
                task
            ))),
        }
    }
}

/// A fittable, predictable pipeline.
pub trait Pipeline: Send {
    /// Fit on features and (normalized) labels.
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Labels) -> Result<()>;

    /// Predict on features.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Predictions>;
}

/// Include/exclude lists restricting which pipeline components may be used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentFilter {
    /// Only these components may be used, when set.
    pub include: Option<Vec<String>>,
    /// These components must not be used.
    pub exclude: Option<Vec<String>>,
}

impl ComponentFilter {
    pub fn new(include: Option<Vec<String>>, exclude: Option<Vec<String>>) -> Self {
        Self { include, exclude }
    }

    /// Reject filters that both include and exclude a component.
    pub fn validate(&self) -> Result<()> {
        if let (Some(include), Some(exclude)) = (&self.include, &self.exclude) {
            if let Some(both) = include.iter().find(|c| exclude.contains(c)) {
                return Err(EvalError::Configuration(format!(
                    "component {} is both included and excluded",
                    both
                )));
            }
        }
        Ok(())
    }

    /// Whether `component` passes the filter.
    pub fn allows(&self, component: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .is_none_or(|include| include.iter().any(|c| c == component));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.iter().any(|c| c == component));
        included && !excluded
    }
}

/// Builds pipelines from configurations.
pub trait PipelineBuilder: Send + Sync {
    /// `label_num` is the dataset's label width (see
    /// [`Dataset::label_num`](crate::Dataset::label_num)); classification
    /// pipelines size their probability output to it even when the rows
    /// they are fitted on miss some classes.
    fn build(
        &self,
        config: &Configuration,
        task: TaskType,
        label_num: usize,
        filter: &ComponentFilter,
    ) -> Result<Box<dyn Pipeline>>;
}
