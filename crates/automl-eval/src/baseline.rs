//! Baseline pipelines.
//!
//! A small, dependency-free [`PipelineBuilder`] so evaluations can run end to
//! end without a full estimator library. Two estimators are available,
//! selected by the `estimator` hyperparameter:
//!
//! - `knn`: k-nearest neighbours (`n_neighbors`, default 5), Euclidean
//!   distance, ties broken by training row order
//! - `prior`: class frequencies, label frequencies or the target mean
//!
//! Both are deterministic, so repeated evaluations give identical losses.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::configuration::{Configuration, HyperValue};
use crate::dataset::{Labels, class_index, num_classes};
use crate::error::{EvalError, Result};
use crate::pipeline::{ComponentFilter, Pipeline, PipelineBuilder, Predictions};
use crate::task::TaskType;

/// Hyperparameter naming the estimator.
pub const ESTIMATOR_KEY: &str = "estimator";

/// Hyperparameter for the neighbour count of `knn`.
pub const NEIGHBORS_KEY: &str = "n_neighbors";

pub const KNN: &str = "knn";
pub const PRIOR: &str = "prior";

/// Estimators in order of preference when the configuration names none.
const ESTIMATORS: [&str; 2] = [KNN, PRIOR];

const DEFAULT_NEIGHBORS: usize = 5;

/// Builds `knn` and `prior` pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineBuilder;

impl BaselineBuilder {
    pub fn new() -> Self {
        Self
    }

    /// The configuration every search starts from.
    pub fn default_configuration() -> Configuration {
        Configuration::new()
            .with(ESTIMATOR_KEY, KNN)
            .with(NEIGHBORS_KEY, DEFAULT_NEIGHBORS as i64)
    }
}

impl PipelineBuilder for BaselineBuilder {
    fn build(
        &self,
        config: &Configuration,
        task: TaskType,
        label_num: usize,
        filter: &ComponentFilter,
    ) -> Result<Box<dyn Pipeline>> {
        filter.validate()?;

        let estimator = match config.get(ESTIMATOR_KEY) {
            Some(value) => value.as_str().ok_or_else(|| {
                EvalError::Configuration(format!(
                    "{} must be a string, got {}",
                    ESTIMATOR_KEY, value
                ))
            })?,
            None => ESTIMATORS
                .into_iter()
                .find(|e| filter.allows(e))
                .ok_or_else(|| {
                    EvalError::Configuration("no estimator left after include/exclude".to_string())
                })?,
        };
        if !filter.allows(estimator) {
            return Err(EvalError::Configuration(format!(
                "estimator {} is excluded",
                estimator
            )));
        }

        match estimator {
            KNN => {
                let k = neighbors(config.get(NEIGHBORS_KEY))?;
                Ok(Box::new(KNearestNeighbors::new(task, k).with_label_num(label_num)))
            }
            PRIOR => Ok(Box::new(Prior::new(task).with_label_num(label_num))),
            other => Err(EvalError::Configuration(format!("unknown estimator: {}", other))),
        }
    }
}

fn neighbors(value: Option<&HyperValue>) -> Result<usize> {
    match value {
        None => Ok(DEFAULT_NEIGHBORS),
        Some(v) => match v.as_i64() {
            Some(k) if k >= 1 => Ok(k as usize),
            _ => Err(EvalError::Configuration(format!(
                "{} must be a positive integer, got {}",
                NEIGHBORS_KEY, v
            ))),
        },
    }
}

/// Width of the probability matrix for single-label classification.
fn class_count(task: TaskType, y: &Array1<f64>) -> Result<usize> {
    let n = num_classes(y)?;
    Ok(match task {
        TaskType::BinaryClassification => n.max(2),
        _ => n,
    })
}

fn check_labels(task: TaskType, y: &Labels) -> Result<()> {
    match (task.is_multilabel(), y) {
        (true, Labels::Matrix(_)) | (false, Labels::Vector(_)) => Ok(()),
        _ => Err(EvalError::Fit(format!("label shape does not fit task {}", task))),
    }
}

fn check_features(x: &ArrayView2<'_, f64>) -> Result<()> {
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(EvalError::Fit("features contain non-finite values".to_string()))
    }
}

// ============================================================================
// k-nearest neighbours
// ============================================================================

struct Fitted {
    x: Array2<f64>,
    y: Labels,
    classes: usize,
}

/// k-nearest neighbours for every task type.
pub struct KNearestNeighbors {
    task: TaskType,
    k: usize,
    label_num: usize,
    fitted: Option<Fitted>,
}

impl KNearestNeighbors {
    pub fn new(task: TaskType, k: usize) -> Self {
        Self {
            task,
            k,
            label_num: 0,
            fitted: None,
        }
    }

    /// Emit at least `label_num` probability columns.
    pub fn with_label_num(mut self, label_num: usize) -> Self {
        self.label_num = label_num;
        self
    }

    fn nearest(&self, fitted: &Fitted, query: ArrayView1<'_, f64>) -> Vec<usize> {
        let mut dists: Vec<(f64, usize)> = fitted
            .x
            .rows()
            .into_iter()
            .enumerate()
            .map(|(j, row)| {
                let d = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>();
                (d, j)
            })
            .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        dists
            .into_iter()
            .take(self.k.min(fitted.x.nrows()))
            .map(|(_, j)| j)
            .collect()
    }
}

impl Pipeline for KNearestNeighbors {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Labels) -> Result<()> {
        check_labels(self.task, y)?;
        check_features(&x)?;
        let classes = match y {
            Labels::Vector(v) if self.task.is_classification() => {
                class_count(self.task, v)?.max(self.label_num)
            }
            _ => 0,
        };
        self.fitted = Some(Fitted {
            x: x.to_owned(),
            y: y.clone(),
            classes,
        });
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| EvalError::Predict("pipeline is not fitted".to_string()))?;
        if x.ncols() != fitted.x.ncols() {
            return Err(EvalError::Predict(format!(
                "expected {} features, got {}",
                fitted.x.ncols(),
                x.ncols()
            )));
        }

        match (&fitted.y, self.task) {
            (Labels::Vector(y), TaskType::Regression) => {
                let values = x
                    .rows()
                    .into_iter()
                    .map(|query| {
                        let rows = self.nearest(fitted, query);
                        rows.iter().map(|&j| y[j]).sum::<f64>() / rows.len() as f64
                    })
                    .collect::<Array1<f64>>();
                Ok(Predictions::Values(values))
            }
            (Labels::Vector(y), _) => {
                let mut probs = Array2::<f64>::zeros((x.nrows(), fitted.classes));
                for (i, query) in x.rows().into_iter().enumerate() {
                    let rows = self.nearest(fitted, query);
                    let weight = 1.0 / rows.len() as f64;
                    for j in rows {
                        probs[[i, class_index(y[j])?]] += weight;
                    }
                }
                Ok(Predictions::Probabilities(probs))
            }
            (Labels::Matrix(y), _) => {
                let mut probs = Array2::<f64>::zeros((x.nrows(), y.ncols()));
                for (i, query) in x.rows().into_iter().enumerate() {
                    let rows = self.nearest(fitted, query);
                    let mean = y
                        .select(Axis(0), &rows)
                        .mean_axis(Axis(0))
                        .ok_or_else(|| EvalError::Predict("no neighbours".to_string()))?;
                    probs.row_mut(i).assign(&mean);
                }
                Ok(Predictions::Probabilities(probs))
            }
        }
    }
}

// ============================================================================
// Prior
// ============================================================================

/// Predicts the training distribution for every sample.
pub struct Prior {
    task: TaskType,
    label_num: usize,
    distribution: Option<Array1<f64>>,
}

impl Prior {
    pub fn new(task: TaskType) -> Self {
        Self {
            task,
            label_num: 0,
            distribution: None,
        }
    }

    /// Emit at least `label_num` probability columns.
    pub fn with_label_num(mut self, label_num: usize) -> Self {
        self.label_num = label_num;
        self
    }
}

impl Pipeline for Prior {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &Labels) -> Result<()> {
        check_labels(self.task, y)?;
        check_features(&x)?;
        let distribution = match y {
            Labels::Vector(v) if self.task == TaskType::Regression => {
                Array1::from_elem(1, v.mean().unwrap_or(0.0))
            }
            Labels::Vector(v) => {
                let width = class_count(self.task, v)?.max(self.label_num);
                let mut counts = Array1::<f64>::zeros(width);
                for &value in v {
                    counts[class_index(value)?] += 1.0;
                }
                counts / v.len() as f64
            }
            Labels::Matrix(m) => m
                .mean_axis(Axis(0))
                .ok_or_else(|| EvalError::Fit("no training rows".to_string()))?,
        };
        self.distribution = Some(distribution);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Predictions> {
        let distribution = self
            .distribution
            .as_ref()
            .ok_or_else(|| EvalError::Predict("pipeline is not fitted".to_string()))?;
        if self.task == TaskType::Regression {
            return Ok(Predictions::Values(Array1::from_elem(x.nrows(), distribution[0])));
        }
        let rows = distribution
            .broadcast((x.nrows(), distribution.len()))
            .ok_or_else(|| EvalError::Predict("cannot broadcast prior".to_string()))?
            .to_owned();
        Ok(Predictions::Probabilities(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn build(config: &Configuration, task: TaskType) -> Result<Box<dyn Pipeline>> {
        BaselineBuilder.build(config, task, 0, &ComponentFilter::default())
    }

    #[test]
    fn test_knn_classification() {
        let x = array![[0.0], [0.1], [1.0], [1.1]];
        let y = Labels::Vector(array![0.0, 0.0, 1.0, 1.0]);
        let config = Configuration::new().with(ESTIMATOR_KEY, KNN).with(NEIGHBORS_KEY, 1i64);
        let mut pipeline = build(&config, TaskType::BinaryClassification).unwrap();
        pipeline.fit(x.view(), &y).unwrap();

        let preds = pipeline.predict(array![[0.05], [0.95]].view()).unwrap();
        assert_eq!(
            preds,
            Predictions::Probabilities(array![[1.0, 0.0], [0.0, 1.0]])
        );
    }

    #[test]
    fn test_knn_regression_averages_neighbours() {
        let x = array![[0.0], [1.0], [2.0], [10.0]];
        let y = Labels::Vector(array![1.0, 2.0, 3.0, 100.0]);
        let config = Configuration::new().with(NEIGHBORS_KEY, 3i64);
        let mut pipeline = build(&config, TaskType::Regression).unwrap();
        pipeline.fit(x.view(), &y).unwrap();
        let preds = pipeline.predict(array![[1.0]].view()).unwrap();
        assert_eq!(preds, Predictions::Values(array![2.0]));
    }

    #[test]
    fn test_knn_multilabel() {
        let x = array![[0.0], [0.2], [5.0]];
        let y = Labels::Matrix(array![[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let config = Configuration::new().with(NEIGHBORS_KEY, 2i64);
        let mut pipeline = build(&config, TaskType::MultilabelClassification).unwrap();
        pipeline.fit(x.view(), &y).unwrap();
        let preds = pipeline.predict(array![[0.1]].view()).unwrap();
        assert_eq!(preds, Predictions::Probabilities(array![[1.0, 0.5]]));
    }

    #[test]
    fn test_prior() {
        let x = array![[0.0], [0.0], [0.0], [0.0]];
        let y = Labels::Vector(array![0.0, 2.0, 2.0, 2.0]);
        let config = Configuration::new().with(ESTIMATOR_KEY, PRIOR);
        let mut pipeline = build(&config, TaskType::MulticlassClassification).unwrap();
        pipeline.fit(x.view(), &y).unwrap();
        let preds = pipeline.predict(array![[3.0], [4.0]].view()).unwrap();
        assert_eq!(
            preds,
            Predictions::Probabilities(array![[0.25, 0.0, 0.75], [0.25, 0.0, 0.75]])
        );
    }

    #[test]
    fn test_probability_width_follows_label_num() {
        let x = array![[0.0], [1.0]];
        let y = Labels::Vector(array![0.0, 1.0]);
        let task = TaskType::MulticlassClassification;
        let filter = ComponentFilter::default();

        let config = Configuration::new().with(NEIGHBORS_KEY, 1i64);
        let mut knn = BaselineBuilder.build(&config, task, 3, &filter).unwrap();
        knn.fit(x.view(), &y).unwrap();
        assert_eq!(
            knn.predict(array![[0.9]].view()).unwrap(),
            Predictions::Probabilities(array![[0.0, 1.0, 0.0]])
        );

        let config = Configuration::new().with(ESTIMATOR_KEY, PRIOR);
        let mut prior = BaselineBuilder.build(&config, task, 3, &filter).unwrap();
        prior.fit(x.view(), &y).unwrap();
        assert_eq!(
            prior.predict(array![[0.0]].view()).unwrap(),
            Predictions::Probabilities(array![[0.5, 0.5, 0.0]])
        );
    }

    #[test]
    fn test_filters() {
        let exclude_knn = ComponentFilter::new(None, Some(vec![KNN.to_string()]));
        let config = Configuration::new();
        assert!(BaselineBuilder
            .build(&config, TaskType::Regression, 0, &exclude_knn)
            .is_ok());

        let config = Configuration::new().with(ESTIMATOR_KEY, KNN);
        let err = BaselineBuilder
            .build(&config, TaskType::Regression, 0, &exclude_knn)
            .err()
            .unwrap();
        assert!(matches!(err, EvalError::Configuration(_)));

        let exclude_all = ComponentFilter::new(None, Some(vec![KNN.into(), PRIOR.into()]));
        assert!(BaselineBuilder
            .build(&Configuration::new(), TaskType::Regression, 0, &exclude_all)
            .is_err());
    }

    #[test]
    fn test_bad_hyperparameters() {
        let config = Configuration::new().with(ESTIMATOR_KEY, "random_forest");
        assert!(build(&config, TaskType::Regression).is_err());

        let config = Configuration::new().with(NEIGHBORS_KEY, 0i64);
        assert!(build(&config, TaskType::Regression).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let pipeline = build(&Configuration::new(), TaskType::Regression).unwrap();
        assert!(pipeline.predict(array![[1.0]].view()).is_err());
    }

    #[test]
    fn test_non_finite_features_fail_fit() {
        let mut pipeline = build(&Configuration::new(), TaskType::Regression).unwrap();
        let err = pipeline
            .fit(array![[f64::NAN]].view(), &Labels::Vector(array![1.0]))
            .unwrap_err();
        assert!(matches!(err, EvalError::Fit(_)));
    }
}
