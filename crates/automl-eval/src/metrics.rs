//! Metric registry and scoring functions.
//!
//! Every metric maps (true labels, predictions) to a score and knows whether
//! that score should be maximized or minimized. The evaluator always works
//! with losses:
//!
//! - maximize: `loss = 1 - score`
//! - minimize: `loss = score`
//!
//! The registry is built once and shared read-only behind an `Arc`.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use ndarray::{Array1, Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::dataset::{Labels, class_index};
use crate::error::{EvalError, Result};
use crate::pipeline::Predictions;
use crate::task::TaskType;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs.
pub const LOG_LOSS_EPS: f64 = 1e-15;

const CLASSIFICATION: &[TaskType] = &[
    TaskType::BinaryClassification,
    TaskType::MulticlassClassification,
    TaskType::MultilabelClassification,
];

const REGRESSION: &[TaskType] = &[TaskType::Regression];

/// Signature shared by all scoring functions.
pub type ScoreFn = fn(TaskType, &Labels, &Predictions) -> Result<f64>;

/// Whether higher or lower scores are better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Maximize,
    Minimize,
}

/// A named scoring function.
#[derive(Debug, Clone)]
pub struct Metric {
    name: String,
    orientation: Orientation,
    bounds: Option<(f64, f64)>,
    tasks: Vec<TaskType>,
    score_fn: ScoreFn,
}

impl Metric {
    /// Create a metric applicable to `tasks`.
    pub fn new(
        name: impl Into<String>,
        orientation: Orientation,
        tasks: &[TaskType],
        score_fn: ScoreFn,
    ) -> Self {
        Self {
            name: name.into(),
            orientation,
            bounds: None,
            tasks: tasks.to_vec(),
            score_fn,
        }
    }

    /// Declare the range the score lives in.
    pub fn with_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some((lower, upper));
        self
    }

    /// Fraction of exactly matching samples (subset accuracy for multilabel).
    pub fn accuracy() -> Self {
        Self::new("accuracy", Orientation::Maximize, CLASSIFICATION, accuracy)
            .with_bounds(0.0, 1.0)
    }

    /// Macro-averaged F1.
    pub fn f1() -> Self {
        Self::new("f1", Orientation::Maximize, CLASSIFICATION, f1_macro).with_bounds(0.0, 1.0)
    }

    /// Macro-averaged precision.
    pub fn precision() -> Self {
        Self::new("precision", Orientation::Maximize, CLASSIFICATION, precision_macro)
            .with_bounds(0.0, 1.0)
    }

    /// Macro-averaged recall.
    pub fn recall() -> Self {
        Self::new("recall", Orientation::Maximize, CLASSIFICATION, recall_macro)
            .with_bounds(0.0, 1.0)
    }

    /// Cross-entropy of predicted probabilities.
    pub fn log_loss() -> Self {
        Self::new("log_loss", Orientation::Minimize, CLASSIFICATION, log_loss)
    }

    /// Coefficient of determination.
    pub fn r2() -> Self {
        Self::new("r2", Orientation::Maximize, REGRESSION, r2)
    }

    pub fn mean_squared_error() -> Self {
        Self::new(
            "mean_squared_error",
            Orientation::Minimize,
            REGRESSION,
            mean_squared_error,
        )
    }

    pub fn mean_absolute_error() -> Self {
        Self::new(
            "mean_absolute_error",
            Orientation::Minimize,
            REGRESSION,
            mean_absolute_error,
        )
    }

    pub fn median_absolute_error() -> Self {
        Self::new(
            "median_absolute_error",
            Orientation::Minimize,
            REGRESSION,
            median_absolute_error,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    pub fn applies_to(&self, task: TaskType) -> bool {
        self.tasks.contains(&task)
    }

    /// Raw score of `predictions` against `y_true`.
    pub fn score(&self, task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
        if !self.applies_to(task) {
            return Err(EvalError::Metric(format!(
                "metric {} does not apply to {}",
                self.name, task
            )));
        }
        if y_true.len() != predictions.len() {
            return Err(EvalError::Metric(format!(
                "{} labels but {} predictions",
                y_true.len(),
                predictions.len()
            )));
        }
        if y_true.is_empty() {
            return Err(EvalError::Metric("no samples to score".to_string()));
        }
        (self.score_fn)(task, y_true, predictions)
    }

    /// Score converted to a loss (lower is better).
    pub fn loss(&self, task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
        let score = self.score(task, y_true, predictions)?;
        Ok(self.to_loss(score))
    }

    pub fn to_loss(&self, score: f64) -> f64 {
        match self.orientation {
            Orientation::Maximize => 1.0 - score,
            Orientation::Minimize => score,
        }
    }
}

/// Ordered table of metrics, read-only once shared.
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    metrics: Vec<Metric>,
}

static STANDARD: LazyLock<Arc<MetricRegistry>> = LazyLock::new(|| {
    let mut registry = MetricRegistry::new();
    for metric in [
        Metric::accuracy(),
        Metric::f1(),
        Metric::precision(),
        Metric::recall(),
        Metric::log_loss(),
        Metric::r2(),
        Metric::mean_squared_error(),
        Metric::mean_absolute_error(),
        Metric::median_absolute_error(),
    ] {
        registry.metrics.push(metric);
    }
    Arc::new(registry)
});

impl MetricRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide standard registry.
    pub fn standard() -> Arc<MetricRegistry> {
        Arc::clone(&STANDARD)
    }

    /// Add a metric. Names must be unique.
    pub fn register(&mut self, metric: Metric) -> Result<()> {
        if self.get(metric.name()).is_some() {
            return Err(EvalError::Metric(format!(
                "metric {} is already registered",
                metric.name()
            )));
        }
        self.metrics.push(metric);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name() == name)
    }

    /// Like [`get`](Self::get) but unknown names are an error.
    pub fn lookup(&self, name: &str) -> Result<&Metric> {
        self.get(name)
            .ok_or_else(|| EvalError::UnknownMetric(name.to_string()))
    }

    /// The metric optimized by default for `task`.
    pub fn default_for(&self, task: TaskType) -> Result<&Metric> {
        self.lookup(task.default_metric())
    }

    /// Metrics legal for `task`, in registration order.
    pub fn applicable(&self, task: TaskType) -> impl Iterator<Item = &Metric> {
        self.metrics.iter().filter(move |m| m.applies_to(task))
    }

    /// Every registered metric, in registration order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(Metric::name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

// ============================================================================
// Label extraction
// ============================================================================

fn class_vector(labels: &Labels) -> Result<Vec<usize>> {
    let v = labels
        .as_vector()
        .ok_or_else(|| EvalError::Metric("expected 1-D class labels".to_string()))?;
    v.iter().map(|&value| class_index(value)).collect()
}

fn indicator_matrix<'a>(labels: &'a Labels, what: &str) -> Result<&'a Array2<f64>> {
    labels
        .as_matrix()
        .ok_or_else(|| EvalError::Metric(format!("expected 2-D indicator {}", what)))
}

fn regression_pair<'a>(
    y_true: &'a Labels,
    predictions: &'a Predictions,
) -> Result<(&'a Array1<f64>, &'a Array1<f64>)> {
    match (y_true.as_vector(), predictions) {
        (Some(t), Predictions::Values(p)) => Ok((t, p)),
        _ => Err(EvalError::Metric(
            "regression metrics need 1-D targets and value predictions".to_string(),
        )),
    }
}

// ============================================================================
// Classification metrics
// ============================================================================

/// Per-class true positive, false positive and false negative counts.
#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    tp: f64,
    fp: f64,
    fn_: f64,
}

impl Counts {
    fn precision(self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(self) -> f64 {
        ratio(2.0 * self.tp, 2.0 * self.tp + self.fp + self.fn_)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn per_class_counts(
    task: TaskType,
    y_true: &Labels,
    predictions: &Predictions,
) -> Result<Vec<Counts>> {
    let y_pred = predictions.hard_labels(task)?;
    if task.is_multilabel() {
        let truth = indicator_matrix(y_true, "labels")?;
        let pred = indicator_matrix(&y_pred, "predictions")?;
        if truth.dim() != pred.dim() {
            return Err(EvalError::Metric(format!(
                "label shape {:?} does not match prediction shape {:?}",
                truth.dim(),
                pred.dim()
            )));
        }
        let mut counts = vec![Counts::default(); truth.ncols()];
        Zip::indexed(truth).and(pred).for_each(|(_, col), &t, &p| {
            let c = &mut counts[col];
            match (t >= 0.5, p >= 0.5) {
                (true, true) => c.tp += 1.0,
                (false, true) => c.fp += 1.0,
                (true, false) => c.fn_ += 1.0,
                (false, false) => {}
            }
        });
        return Ok(counts);
    }

    let truth = class_vector(y_true)?;
    let pred = class_vector(&y_pred)?;
    let classes: BTreeSet<usize> = truth.iter().chain(pred.iter()).copied().collect();
    Ok(classes
        .into_iter()
        .map(|class| {
            let mut c = Counts::default();
            for (&t, &p) in truth.iter().zip(pred.iter()) {
                match (t == class, p == class) {
                    (true, true) => c.tp += 1.0,
                    (false, true) => c.fp += 1.0,
                    (true, false) => c.fn_ += 1.0,
                    (false, false) => {}
                }
            }
            c
        })
        .collect())
}

fn macro_average(counts: &[Counts], f: fn(Counts) -> f64) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    counts.iter().copied().map(f).sum::<f64>() / counts.len() as f64
}

fn accuracy(task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    let y_pred = predictions.hard_labels(task)?;
    if task.is_multilabel() {
        let truth = indicator_matrix(y_true, "labels")?;
        let pred = indicator_matrix(&y_pred, "predictions")?;
        if truth.dim() != pred.dim() {
            return Err(EvalError::Metric("label and prediction shapes differ".to_string()));
        }
        let matching = truth
            .rows()
            .into_iter()
            .zip(pred.rows())
            .filter(|(t, p)| t.iter().zip(p.iter()).all(|(a, b)| (*a >= 0.5) == (*b >= 0.5)))
            .count();
        return Ok(matching as f64 / truth.nrows() as f64);
    }
    let truth = class_vector(y_true)?;
    let pred = class_vector(&y_pred)?;
    let matching = truth.iter().zip(pred.iter()).filter(|(t, p)| t == p).count();
    Ok(matching as f64 / truth.len() as f64)
}

fn precision_macro(task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    Ok(macro_average(&per_class_counts(task, y_true, predictions)?, Counts::precision))
}

fn recall_macro(task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    Ok(macro_average(&per_class_counts(task, y_true, predictions)?, Counts::recall))
}

fn f1_macro(task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    Ok(macro_average(&per_class_counts(task, y_true, predictions)?, Counts::f1))
}

fn log_loss(task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    let Predictions::Probabilities(probs) = predictions else {
        return Err(EvalError::Metric("log_loss needs probabilities".to_string()));
    };
    let clip = |p: f64| p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);

    if task.is_multilabel() {
        let truth = indicator_matrix(y_true, "labels")?;
        if truth.dim() != probs.dim() {
            return Err(EvalError::Metric("label and probability shapes differ".to_string()));
        }
        let mut total = 0.0;
        Zip::from(truth).and(probs).for_each(|&t, &p| {
            let p = clip(p);
            total -= if t >= 0.5 { p.ln() } else { (1.0 - p).ln() };
        });
        return Ok(total / truth.len() as f64);
    }

    let truth = class_vector(y_true)?;
    let mut total = 0.0;
    for (&class, row) in truth.iter().zip(probs.rows()) {
        let clipped = row.mapv(clip);
        // Columns missing up to `class` count as zero probability.
        let missing = (class + 1).saturating_sub(row.len());
        let norm = clipped.sum() + missing as f64 * LOG_LOSS_EPS;
        let p = clipped.get(class).copied().unwrap_or(LOG_LOSS_EPS);
        total -= (p / norm).ln();
    }
    Ok(total / truth.len() as f64)
}

// ============================================================================
// Regression metrics
// ============================================================================

fn r2(_task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    let (t, p) = regression_pair(y_true, predictions)?;
    let mean = t.mean().unwrap_or(0.0);
    let ss_res: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();
    let ss_tot: f64 = t.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

fn mean_squared_error(_task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    let (t, p) = regression_pair(y_true, predictions)?;
    Ok((t - p).mapv(|e| e * e).mean().unwrap_or(0.0))
}

fn mean_absolute_error(_task: TaskType, y_true: &Labels, predictions: &Predictions) -> Result<f64> {
    let (t, p) = regression_pair(y_true, predictions)?;
    Ok((t - p).mapv(f64::abs).mean().unwrap_or(0.0))
}

fn median_absolute_error(
    _task: TaskType,
    y_true: &Labels,
    predictions: &Predictions,
) -> Result<f64> {
    let (t, p) = regression_pair(y_true, predictions)?;
    let mut errors: Vec<f64> = t.iter().zip(p.iter()).map(|(a, b)| (a - b).abs()).collect();
    errors.sort_by(f64::total_cmp);
    let mid = errors.len() / 2;
    Ok(if errors.len() % 2 == 0 {
        (errors[mid - 1] + errors[mid]) / 2.0
    } else {
        errors[mid]
    })
}
