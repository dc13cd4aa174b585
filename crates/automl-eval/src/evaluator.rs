//! Test-split evaluator.
//!
//! [`TestEvaluator`] fits one configuration, predicts on the evaluation
//! split, scores the predictions and pushes exactly one [`ResultRecord`]
//! to its [`ResultSender`]. Errors and panics from the pipeline are turned
//! into crash records; nothing escapes to the caller.

use std::borrow::Cow;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use ndarray::Axis;
use tracing::{debug, info, info_span, warn};

use crate::backend::{Backend, PredictionSubset};
use crate::channel::ResultSender;
use crate::configuration::Configuration;
use crate::dataset::{Dataset, Labels};
use crate::error::{EvalError, Result};
use crate::metrics::{Metric, MetricRegistry};
use crate::pipeline::{ComponentFilter, PipelineBuilder, Predictions};
use crate::record::{DURATION_KEY, NUM_RUN_KEY, ResultRecord, RunInfo, ScoreReport};
use crate::settings::EvaluatorSettings;
use crate::subsample::subsample_indices;
use crate::task::TaskType;

/// `num_run` written into score reports of test-split evaluations.
///
/// Test-split runs are not part of the optimizer's run sequence, so the
/// report carries this sentinel instead of the request's run number.
pub const TEST_RUN_ID: i64 = -1;

/// Collaborators shared by many evaluations.
#[derive(Clone)]
pub struct EvalContext {
    pub registry: Arc<MetricRegistry>,
    pub builder: Arc<dyn PipelineBuilder>,
    pub backend: Arc<dyn Backend>,
    pub settings: EvaluatorSettings,
}

impl EvalContext {
    /// Context with the standard metric registry and default settings.
    pub fn new(builder: Arc<dyn PipelineBuilder>, backend: Arc<dyn Backend>) -> Self {
        Self {
            registry: MetricRegistry::standard(),
            builder,
            backend,
            settings: EvaluatorSettings::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_settings(mut self, settings: EvaluatorSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Everything that identifies one evaluation.
#[derive(Debug, Clone)]
pub struct EvalRequest {
    pub config: Arc<Configuration>,
    pub data: Arc<Dataset>,
    /// Metric whose loss becomes the record's `result`.
    pub metric: Metric,
    pub seed: u64,
    pub num_run: i64,
    /// Fit on at most this many training rows.
    pub subsample: Option<usize>,
    /// Report every applicable registered metric, not just `metric`.
    pub all_scoring_functions: bool,
    /// Also store predictions as the optimization subset.
    pub output_y_hat_optimization: bool,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Skip the backend entirely.
    pub disable_file_output: bool,
    /// Opaque caller identifier, only used for logging.
    pub instance: Option<String>,
}

impl EvalRequest {
    /// Request with seed 1, run number 1 and every option off.
    pub fn new(config: Arc<Configuration>, data: Arc<Dataset>, metric: Metric) -> Self {
        Self {
            config,
            data,
            metric,
            seed: 1,
            num_run: 1,
            subsample: None,
            all_scoring_functions: false,
            output_y_hat_optimization: false,
            include: None,
            exclude: None,
            disable_file_output: false,
            instance: None,
        }
    }

    /// Request optimizing the registry's default metric for the dataset's task.
    pub fn with_default_metric(
        config: Arc<Configuration>,
        data: Arc<Dataset>,
        registry: &MetricRegistry,
    ) -> Result<Self> {
        let metric = registry.default_for(data.task())?.clone();
        Ok(Self::new(config, data, metric))
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn num_run(mut self, num_run: i64) -> Self {
        self.num_run = num_run;
        self
    }

    pub fn subsample(mut self, size: usize) -> Self {
        self.subsample = Some(size);
        self
    }

    pub fn all_scoring_functions(mut self, enabled: bool) -> Self {
        self.all_scoring_functions = enabled;
        self
    }

    pub fn output_y_hat_optimization(mut self, enabled: bool) -> Self {
        self.output_y_hat_optimization = enabled;
        self
    }

    pub fn include(mut self, components: Vec<String>) -> Self {
        self.include = Some(components);
        self
    }

    pub fn exclude(mut self, components: Vec<String>) -> Self {
        self.exclude = Some(components);
        self
    }

    pub fn disable_file_output(mut self, disabled: bool) -> Self {
        self.disable_file_output = disabled;
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

/// Evaluates one request and reports through its sender.
pub struct TestEvaluator {
    context: EvalContext,
    request: EvalRequest,
    sender: ResultSender,
}

impl TestEvaluator {
    pub fn new(context: EvalContext, request: EvalRequest, sender: ResultSender) -> Self {
        Self {
            context,
            request,
            sender,
        }
    }

    /// Fit, predict, score, persist and report. Always sends one record.
    pub fn fit_predict_and_loss(self) {
        let span = info_span!(
            "evaluation",
            dataset = %self.request.data.name(),
            metric = %self.request.metric.name(),
            seed = self.request.seed,
            num_run = self.request.num_run,
            instance = self.request.instance.as_deref().unwrap_or(""),
        );
        let _guard = span.enter();

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.evaluate(start)));
        let record = match outcome {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => self.error_record(start, &err),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(%message, "Pipeline panicked");
                ResultRecord::crashed(
                    start.elapsed().as_secs_f64(),
                    self.context.settings.worst_possible_result,
                    self.request.seed,
                    format!("panic: {}", message),
                )
            }
        };
        self.report(record);
    }

    fn evaluate(&self, start: Instant) -> Result<ResultRecord> {
        let request = &self.request;
        let data = request.data.as_ref();
        let task = data.task();

        let filter = ComponentFilter::new(request.include.clone(), request.exclude.clone());
        let label_num = data.label_num()?;
        let mut pipeline = self
            .context
            .builder
            .build(&request.config, task, label_num, &filter)?;

        let train = data.train();
        let y_train = train.y.normalized_for(task)?;
        let (x_fit, y_fit) = match request.subsample {
            Some(size) => {
                let rows = subsample_indices(
                    self.context.settings.subsample_policy,
                    task,
                    &y_train,
                    size,
                    request.seed,
                )?;
                debug!(rows = rows.len(), of = train.len(), "Subsampled training split");
                (
                    Cow::Owned(train.x.select(Axis(0), &rows)),
                    Cow::Owned(y_train.select(&rows)),
                )
            }
            None => (Cow::Borrowed(&train.x), Cow::Borrowed(&y_train)),
        };
        pipeline.fit(x_fit.view(), &y_fit)?;

        let split = data.evaluation_split();
        let y_eval = split.y.normalized_for(task)?;
        let predictions = pipeline.predict(split.x.view())?;
        if predictions.len() != split.len() {
            return Err(EvalError::Predict(format!(
                "pipeline returned {} predictions for {} rows",
                predictions.len(),
                split.len()
            )));
        }

        let loss = request.metric.loss(task, &y_eval, &predictions)?;
        if !loss.is_finite() {
            return Err(EvalError::NonFiniteLoss {
                metric: request.metric.name().to_string(),
                value: loss,
            });
        }
        let scores = if request.all_scoring_functions {
            Some(self.all_scores(task, &y_eval, &predictions, loss)?)
        } else {
            None
        };
        let duration = start.elapsed().as_secs_f64();

        let run_info = match scores {
            Some(mut report) => {
                report.insert(DURATION_KEY, duration);
                report.insert(NUM_RUN_KEY, TEST_RUN_ID as f64);
                RunInfo::Scores(report)
            }
            None => RunInfo::Loss(loss),
        };

        self.persist(&predictions)?;
        Ok(ResultRecord::success(duration, loss, request.seed, run_info))
    }

    /// Loss of every applicable registered metric. The optimization metric
    /// reuses `loss` so its entry matches the record's `result`.
    fn all_scores(
        &self,
        task: TaskType,
        y: &Labels,
        predictions: &Predictions,
        loss: f64,
    ) -> Result<ScoreReport> {
        let optimized = self.request.metric.name();
        let mut report = ScoreReport::new();
        for metric in self.context.registry.applicable(task) {
            let value = if metric.name() == optimized {
                loss
            } else {
                metric.loss(task, y, predictions)?
            };
            report.insert(metric.name(), value);
        }
        report.insert(optimized, loss);
        Ok(report)
    }

    fn persist(&self, predictions: &Predictions) -> Result<()> {
        let request = &self.request;
        if request.disable_file_output {
            return Ok(());
        }
        let backend = self.context.backend.as_ref();
        backend.store_predictions(
            PredictionSubset::Test,
            request.num_run,
            request.seed,
            predictions,
        )?;
        if request.output_y_hat_optimization {
            backend.store_predictions(
                PredictionSubset::Optimization,
                request.num_run,
                request.seed,
                predictions,
            )?;
        }
        Ok(())
    }

    fn error_record(&self, start: Instant, err: &EvalError) -> ResultRecord {
        let duration = start.elapsed().as_secs_f64();
        let worst = self.context.settings.worst_possible_result;
        let seed = self.request.seed;
        match err {
            EvalError::NonFiniteLoss { .. } => {
                warn!(error = %err, "Evaluation produced a non-finite loss");
                ResultRecord::failure(duration, worst, seed, err.diagnostic())
            }
            _ => {
                warn!(error = %err, "Evaluation crashed");
                ResultRecord::crashed(duration, worst, seed, err.diagnostic())
            }
        }
    }

    fn report(self, record: ResultRecord) {
        info!(
            status = %record.status,
            result = record.result,
            duration = record.duration,
            "Evaluation finished"
        );
        if let Err(err) = self.sender.send(record) {
            warn!(error = %err, "Result reader went away before the record was sent");
        }
    }
}

/// Evaluate `request` and push the record to `sender`.
pub fn eval_test(context: EvalContext, request: EvalRequest, sender: ResultSender) {
    TestEvaluator::new(context, request, sender).fit_predict_and_loss();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
