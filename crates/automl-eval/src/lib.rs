//! Single-configuration evaluation for an AutoML search loop.
//!
//! This crate provides the pieces an optimizer needs to score one candidate:
//! - A metric registry with classification and regression metrics
//! - A pipeline builder seam and a small k-NN / prior baseline
//! - The test evaluator, which fits, predicts, scores and persists
//! - A one-shot result channel and worker threads with timeouts
//!
//! # Example
//!
//! ```rust,ignore
//! use automl_eval::{BaselineBuilder, EvalContext, EvalRequest, NoopBackend, spawn_evaluation};
//!
//! let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
//! let request = EvalRequest::with_default_metric(config, data, &context.registry)?
//!     .seed(1)
//!     .all_scoring_functions(true);
//!
//! let record = spawn_evaluation(context, request)?.wait();
//! println!("{} {}", record.status, record.run_info);
//! ```

mod backend;
mod baseline;
mod channel;
mod configuration;
mod dataset;
mod error;
mod evaluator;
pub mod job;
pub mod metrics;
mod pipeline;
mod record;
mod settings;
mod subsample;
mod task;
mod worker;

pub use backend::{Backend, FileBackend, NoopBackend, PredictionSubset};
pub use baseline::{BaselineBuilder, KNearestNeighbors, Prior};
pub use channel::{ResultReceiver, ResultSender, get_last_result, result_channel};
pub use configuration::{Configuration, HyperValue};
pub use dataset::{Dataset, Labels, Split};
pub use error::{ChannelError, EvalError, Result};
pub use evaluator::{EvalContext, EvalRequest, TEST_RUN_ID, TestEvaluator, eval_test};
pub use job::EvalJob;
pub use metrics::{Metric, MetricRegistry, Orientation};
pub use pipeline::{ComponentFilter, Pipeline, PipelineBuilder, Predictions};
pub use record::{
    DURATION_KEY, NUM_RUN_KEY, ResultRecord, RunInfo, ScoreReport, Status, WORST_POSSIBLE_RESULT,
};
pub use settings::EvaluatorSettings;
pub use subsample::{SubsamplePolicy, subsample_indices};
pub use task::TaskType;
pub use worker::{EvaluationHandle, evaluate_all, spawn_evaluation};
