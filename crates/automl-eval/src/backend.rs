//! Prediction persistence.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{EvalError, Result};
use crate::pipeline::Predictions;

/// Which split a set of stored predictions belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSubset {
    /// Predictions the optimizer scores against (used for ensembling).
    Optimization,
    /// Predictions on the held-out test split.
    Test,
}

impl fmt::Display for PredictionSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PredictionSubset::Optimization => "ensemble",
            PredictionSubset::Test => "test",
        })
    }
}

/// Stores predictions for later ensembling.
pub trait Backend: Send + Sync {
    fn store_predictions(
        &self,
        subset: PredictionSubset,
        num_run: i64,
        seed: u64,
        predictions: &Predictions,
    ) -> Result<()>;
}

/// Backend that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBackend;

impl Backend for NoopBackend {
    fn store_predictions(
        &self,
        _subset: PredictionSubset,
        _num_run: i64,
        _seed: u64,
        _predictions: &Predictions,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct StoredPredictions<'a> {
    subset: PredictionSubset,
    num_run: i64,
    seed: u64,
    predictions: &'a Predictions,
}

/// Backend writing one JSON file per subset and run.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Create the backend, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path predictions for `subset`/`seed`/`num_run` are written to.
    pub fn prediction_path(&self, subset: PredictionSubset, num_run: i64, seed: u64) -> PathBuf {
        self.dir
            .join(format!("predictions_{}_{}_{}.json", subset, seed, num_run))
    }
}

impl Backend for FileBackend {
    fn store_predictions(
        &self,
        subset: PredictionSubset,
        num_run: i64,
        seed: u64,
        predictions: &Predictions,
    ) -> Result<()> {
        let path = self.prediction_path(subset, num_run, seed);
        let stored = StoredPredictions {
            subset,
            num_run,
            seed,
            predictions,
        };
        let content = serde_json::to_string(&stored)?;
        fs::write(&path, content)
            .map_err(|e| EvalError::Backend(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Stored predictions");
        Ok(())
    }
}
