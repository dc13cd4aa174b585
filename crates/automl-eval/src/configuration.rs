//! Pipeline hyperparameter configurations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl HyperValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HyperValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HyperValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HyperValue::Float(f) => Some(*f),
            HyperValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HyperValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for HyperValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperValue::Bool(b) => write!(f, "{}", b),
            HyperValue::Int(i) => write!(f, "{}", i),
            HyperValue::Float(x) => write!(f, "{}", x),
            HyperValue::Str(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<bool> for HyperValue {
    fn from(value: bool) -> Self {
        HyperValue::Bool(value)
    }
}

impl From<i64> for HyperValue {
    fn from(value: i64) -> Self {
        HyperValue::Int(value)
    }
}

impl From<f64> for HyperValue {
    fn from(value: f64) -> Self {
        HyperValue::Float(value)
    }
}

impl From<&str> for HyperValue {
    fn from(value: &str) -> Self {
        HyperValue::Str(value.to_string())
    }
}

impl From<String> for HyperValue {
    fn from(value: String) -> Self {
        HyperValue::Str(value)
    }
}

/// An immutable point in a configuration space.
///
/// The evaluator never looks inside; it hands the configuration to the
/// [`PipelineBuilder`](crate::PipelineBuilder).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    values: BTreeMap<String, HyperValue>,
}

impl Configuration {
    /// Empty configuration; builders fall back to their defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hyperparameter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<HyperValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&HyperValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HyperValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<HyperValue>> FromIterator<(K, V)> for Configuration {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration(")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, ")")
    }
}
