//! Read-only dataset handles.
//!
//! A [`Dataset`] owns a training split and an optional held-out test split.
//! The evaluator only ever reads from it; label normalization returns new
//! arrays and leaves the caller's data untouched.

use ndarray::{Array1, Array2, Axis};

use crate::error::{EvalError, Result};
use crate::task::TaskType;

/// Label structure of one split.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// One value per sample: class index for classification, target for regression.
    Vector(Array1<f64>),
    /// Indicator matrix (`samples × labels`) for multilabel tasks, or a
    /// single-column matrix that still needs squeezing.
    Matrix(Array2<f64>),
}

impl Labels {
    /// Number of samples.
    pub fn len(&self) -> usize {
        match self {
            Labels::Vector(v) => v.len(),
            Labels::Matrix(m) => m.nrows(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_vector(&self) -> Option<&Array1<f64>> {
        match self {
            Labels::Vector(v) => Some(v),
            Labels::Matrix(_) => None,
        }
    }

    pub fn as_matrix(&self) -> Option<&Array2<f64>> {
        match self {
            Labels::Vector(_) => None,
            Labels::Matrix(m) => Some(m),
        }
    }

    /// Rows at the given indices, in order.
    pub fn select(&self, rows: &[usize]) -> Labels {
        match self {
            Labels::Vector(v) => Labels::Vector(v.select(Axis(0), rows)),
            Labels::Matrix(m) => Labels::Matrix(m.select(Axis(0), rows)),
        }
    }

    /// Copy of the labels in the shape `task` expects.
    ///
    /// Single-label tasks squeeze an `n × 1` matrix to a vector. Multilabel
    /// tasks keep their indicator matrix.
    pub fn normalized_for(&self, task: TaskType) -> Result<Labels> {
        match (task.is_multilabel(), self) {
            (true, Labels::Matrix(m)) => Ok(Labels::Matrix(m.clone())),
            (true, Labels::Vector(_)) => Err(EvalError::Dataset(
                "multilabel task needs a 2-D indicator matrix".to_string(),
            )),
            (false, Labels::Vector(v)) => Ok(Labels::Vector(v.clone())),
            (false, Labels::Matrix(m)) if m.ncols() == 1 => {
                Ok(Labels::Vector(m.column(0).to_owned()))
            }
            (false, Labels::Matrix(m)) => Err(EvalError::Dataset(format!(
                "{} task needs 1-D labels, got {} columns",
                task,
                m.ncols()
            ))),
        }
    }
}

/// Convert a stored class label to a class index.
pub fn class_index(value: f64) -> Result<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(EvalError::Dataset(format!(
            "class labels must be non-negative integers, got {}",
            value
        )))
    }
}

/// Number of classes implied by single-label class indices (`max + 1`).
pub fn num_classes(y: &Array1<f64>) -> Result<usize> {
    let mut max = 0;
    for &value in y {
        max = max.max(class_index(value)?);
    }
    Ok(if y.is_empty() { 0 } else { max + 1 })
}

/// Features and labels of one split.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub x: Array2<f64>,
    pub y: Labels,
}

impl Split {
    /// Create a split, checking that features and labels have the same row count.
    pub fn new(x: Array2<f64>, y: Labels) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(EvalError::Dataset(format!(
                "feature rows ({}) do not match label rows ({})",
                x.nrows(),
                y.len()
            )));
        }
        Ok(Self { x, y })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }
}

/// A named dataset tagged with its task type.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    task: TaskType,
    train: Split,
    test: Option<Split>,
}

impl Dataset {
    /// Create a dataset with only a training split.
    pub fn new(name: impl Into<String>, task: TaskType, train: Split) -> Result<Self> {
        if train.is_empty() {
            return Err(EvalError::Dataset("training split is empty".to_string()));
        }
        Ok(Self {
            name: name.into(),
            task,
            train,
            test: None,
        })
    }

    /// Attach a held-out test split.
    pub fn with_test(mut self, test: Split) -> Result<Self> {
        if test.x.ncols() != self.train.x.ncols() {
            return Err(EvalError::Dataset(format!(
                "test split has {} features, training split has {}",
                test.x.ncols(),
                self.train.x.ncols()
            )));
        }
        self.test = Some(test);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self) -> TaskType {
        self.task
    }

    pub fn train(&self) -> &Split {
        &self.train
    }

    pub fn test(&self) -> Option<&Split> {
        self.test.as_ref()
    }

    /// Width of the label space across both splits.
    ///
    /// Classes for single-label classification (at least 2 for binary),
    /// label columns for multilabel, 0 for regression. Pipelines fitted on a
    /// subset of the rows use this to size their probability output.
    pub fn label_num(&self) -> Result<usize> {
        let mut label_num = 0;
        for split in std::iter::once(&self.train).chain(self.test.as_ref()) {
            let width = match split.y.normalized_for(self.task)? {
                Labels::Matrix(m) => m.ncols(),
                Labels::Vector(v) if self.task.is_classification() => num_classes(&v)?,
                Labels::Vector(_) => 0,
            };
            label_num = label_num.max(width);
        }
        if self.task == TaskType::BinaryClassification {
            label_num = label_num.max(2);
        }
        Ok(label_num)
    }

    /// Split that predictions are scored on: the test split when present,
    /// otherwise the training split.
    pub fn evaluation_split(&self) -> &Split {
        self.test.as_ref().unwrap_or(&self.train)
    }
}
