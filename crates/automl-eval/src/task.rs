//! Task types supported by the evaluator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EvalError;

/// Learning task a dataset is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Two classes, labels are `0` or `1`.
    BinaryClassification,
    /// More than two mutually exclusive classes.
    MulticlassClassification,
    /// Several independent binary labels per sample (indicator matrix).
    MultilabelClassification,
    /// Real-valued target.
    Regression,
}

impl TaskType {
    /// All task types, in declaration order.
    pub const ALL: [TaskType; 4] = [
        TaskType::BinaryClassification,
        TaskType::MulticlassClassification,
        TaskType::MultilabelClassification,
        TaskType::Regression,
    ];

    /// Whether this is one of the classification tasks.
    pub fn is_classification(self) -> bool {
        !matches!(self, TaskType::Regression)
    }

    /// Whether labels for this task are a 2-D indicator matrix.
    pub fn is_multilabel(self) -> bool {
        matches!(self, TaskType::MultilabelClassification)
    }

    /// Name of the metric optimized when the caller does not pick one.
    pub fn default_metric(self) -> &'static str {
        match self {
            TaskType::BinaryClassification | TaskType::MulticlassClassification => "accuracy",
            TaskType::MultilabelClassification => "f1",
            TaskType::Regression => "r2",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::BinaryClassification => "binary_classification",
            TaskType::MulticlassClassification => "multiclass_classification",
            TaskType::MultilabelClassification => "multilabel_classification",
            TaskType::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| EvalError::Dataset(format!("unknown task type: {}", s)))
    }
}
