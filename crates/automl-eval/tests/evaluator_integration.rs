//! End-to-end evaluator tests.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use automl_eval::{
    Backend, BaselineBuilder, ChannelError, ComponentFilter, Configuration, DURATION_KEY, Dataset,
    EvalContext, EvalError, EvalJob, EvalRequest, EvaluatorSettings, Labels, Metric,
    MetricRegistry, NUM_RUN_KEY, NoopBackend, Pipeline, PipelineBuilder, PredictionSubset,
    Predictions, ResultRecord, RunInfo, ScoreReport, Split, Status, SubsamplePolicy, TaskType,
    WORST_POSSIBLE_RESULT, eval_test, result_channel, spawn_evaluation,
};
use ndarray::{Array1, Array2, ArrayView2, array};
use pretty_assertions::assert_eq;

const EPS: f64 = 1e-9;

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPS,
        "expected {expected}, got {actual}"
    );
}

// ============================================================================
// Test doubles
// ============================================================================

/// Returns the same predictions whatever it was fitted on.
struct FixedPipeline {
    predictions: Predictions,
}

impl Pipeline for FixedPipeline {
    fn fit(&mut self, _x: ArrayView2<'_, f64>, _y: &Labels) -> automl_eval::Result<()> {
        Ok(())
    }

    fn predict(&self, _x: ArrayView2<'_, f64>) -> automl_eval::Result<Predictions> {
        Ok(self.predictions.clone())
    }
}

struct FixedBuilder(Predictions);

impl PipelineBuilder for FixedBuilder {
    fn build(
        &self,
        _config: &Configuration,
        _task: TaskType,
        _label_num: usize,
        _filter: &ComponentFilter,
    ) -> automl_eval::Result<Box<dyn Pipeline>> {
        Ok(Box::new(FixedPipeline {
            predictions: self.0.clone(),
        }))
    }
}

struct PanickingPipeline;

impl Pipeline for PanickingPipeline {
    fn fit(&mut self, _x: ArrayView2<'_, f64>, _y: &Labels) -> automl_eval::Result<()> {
        Ok(())
    }

    fn predict(&self, _x: ArrayView2<'_, f64>) -> automl_eval::Result<Predictions> {
        panic!("estimator blew up");
    }
}

struct SlowPipeline(Duration);

impl Pipeline for SlowPipeline {
    fn fit(&mut self, _x: ArrayView2<'_, f64>, _y: &Labels) -> automl_eval::Result<()> {
        thread::sleep(self.0);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> automl_eval::Result<Predictions> {
        Ok(Predictions::Values(Array1::zeros(x.nrows())))
    }
}

/// Builds whatever the closure returns.
struct FnBuilder<F>(F);

impl<F> PipelineBuilder for FnBuilder<F>
where
    F: Fn() -> Box<dyn Pipeline> + Send + Sync,
{
    fn build(
        &self,
        _config: &Configuration,
        _task: TaskType,
        _label_num: usize,
        _filter: &ComponentFilter,
    ) -> automl_eval::Result<Box<dyn Pipeline>> {
        Ok((self.0)())
    }
}

#[derive(Default)]
struct RecordingBackend {
    calls: Mutex<Vec<(PredictionSubset, i64, u64)>>,
    fail: bool,
}

impl RecordingBackend {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<(PredictionSubset, i64, u64)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Backend for RecordingBackend {
    fn store_predictions(
        &self,
        subset: PredictionSubset,
        num_run: i64,
        seed: u64,
        _predictions: &Predictions,
    ) -> automl_eval::Result<()> {
        if self.fail {
            return Err(EvalError::Backend("disk full".to_string()));
        }
        self.calls.lock().unwrap().push((subset, num_run, seed));
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Ten samples, three classes; rows 3 and 7 are misclassified.
fn fixed_multiclass() -> (Arc<Dataset>, Predictions) {
    let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0];
    let x = Array2::from_shape_fn((10, 2), |(i, j)| (i * 2 + j) as f64);
    let mut probs = Array2::from_elem((10, 3), 0.1);
    for (row, &class) in y.iter().enumerate() {
        probs[[row, class as usize]] = 0.8;
    }
    probs.row_mut(3).assign(&array![0.1, 0.8, 0.1]);
    probs.row_mut(7).assign(&array![0.1, 0.1, 0.8]);

    let train = Split::new(x, Labels::Vector(y)).unwrap();
    let data = Dataset::new("fixed", TaskType::MulticlassClassification, train).unwrap();
    (Arc::new(data), Predictions::Probabilities(probs))
}

fn dataset(task: TaskType) -> Arc<Dataset> {
    let x = Array2::from_shape_fn((12, 2), |(i, j)| (i as f64) * (j as f64 + 1.0));
    let y = match task {
        TaskType::BinaryClassification => {
            Labels::Vector(Array1::from_shape_fn(12, |i| (i % 2) as f64))
        }
        TaskType::MulticlassClassification => {
            Labels::Vector(Array1::from_shape_fn(12, |i| (i % 3) as f64))
        }
        TaskType::MultilabelClassification => {
            Labels::Matrix(Array2::from_shape_fn((12, 3), |(i, j)| ((i + j) % 2) as f64))
        }
        TaskType::Regression => Labels::Vector(Array1::from_shape_fn(12, |i| i as f64 * 0.5)),
    };
    let train = Split::new(x, y).unwrap();
    Arc::new(Dataset::new(task.as_str(), task, train).unwrap())
}

fn knn(k: i64) -> Arc<Configuration> {
    Arc::new(
        Configuration::new()
            .with("estimator", "knn")
            .with("n_neighbors", k),
    )
}

fn evaluate(context: EvalContext, request: EvalRequest) -> ResultRecord {
    let (sender, receiver) = result_channel();
    eval_test(context, request, sender);
    let record = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
    // The sender is consumed by the single write.
    assert_eq!(receiver.try_recv(), Err(ChannelError::Disconnected));
    record
}

fn fixed_context(predictions: Predictions) -> EvalContext {
    EvalContext::new(Arc::new(FixedBuilder(predictions)), Arc::new(NoopBackend))
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn test_simple_mode_reports_optimization_loss() {
    telemetry::init_test();
    let (data, predictions) = fixed_multiclass();
    let request = EvalRequest::new(Arc::new(Configuration::new()), data, Metric::accuracy());

    let record = evaluate(fixed_context(predictions), request);

    assert_eq!(record.status, Status::Success);
    assert_eq!(record.seed, 1);
    assert_close(record.result, 0.2);
    assert!(record.duration >= 0.0);
    assert_eq!(record.run_info, RunInfo::Loss(record.result));
}

#[test]
fn test_all_scoring_functions_report() {
    telemetry::init_test();
    let (data, predictions) = fixed_multiclass();
    let request = EvalRequest::new(Arc::new(Configuration::new()), data, Metric::accuracy())
        .num_run(7)
        .all_scoring_functions(true);

    let record = evaluate(fixed_context(predictions), request);
    assert_eq!(record.status, Status::Success);

    let report = record.run_info.scores().unwrap();
    let keys: Vec<&str> = report.iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        vec!["accuracy", "f1", "precision", "recall", "log_loss", DURATION_KEY, NUM_RUN_KEY]
    );
    assert_eq!(report.get("accuracy"), Some(record.result));
    assert_close(record.result, 0.2);
    assert_close(report.get("precision").unwrap(), 1.0 - (1.0 + 0.75 + 2.0 / 3.0) / 3.0);
    assert_close(report.get("recall").unwrap(), 1.0 - (0.75 + 0.75 + 1.0) / 3.0);
    assert_close(report.get("f1").unwrap(), 1.0 - (6.0 / 7.0 + 0.75 + 0.8) / 3.0);
    assert_close(
        report.get("log_loss").unwrap(),
        -(8.0 * 0.8f64.ln() + 2.0 * 0.1f64.ln()) / 10.0,
    );
    assert_eq!(report.get(NUM_RUN_KEY), Some(-1.0));
    assert_eq!(report.get(DURATION_KEY), Some(record.duration));

    // The textual form parses back to the same keys.
    let parsed: ScoreReport = record.run_info.to_string().parse().unwrap();
    let applicable = MetricRegistry::standard()
        .applicable(TaskType::MulticlassClassification)
        .count();
    assert_eq!(parsed.len(), applicable + 2);
    assert!(parsed.get("bac_metric").is_none());
}

#[test]
fn test_every_task_with_default_metric() {
    telemetry::init_test();
    let registry = MetricRegistry::standard();
    for task in TaskType::ALL {
        let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
        let request = EvalRequest::with_default_metric(knn(1), dataset(task), &registry)
            .unwrap()
            .all_scoring_functions(true);

        let record = evaluate(context, request);

        assert_eq!(record.status, Status::Success, "{task}: {}", record.run_info);
        assert_close(record.result, 0.0);
        let report = record.run_info.scores().unwrap();
        assert_eq!(report.len(), registry.applicable(task).count() + 2, "{task}");
    }
}

#[test]
fn test_single_column_labels_match_vector_labels() {
    telemetry::init_test();
    let data = dataset(TaskType::BinaryClassification);
    let train = data.train();
    let column = train.y.as_vector().unwrap().clone().insert_axis(ndarray::Axis(1));
    let squeezed = Arc::new(
        Dataset::new(
            "column",
            TaskType::BinaryClassification,
            Split::new(train.x.clone(), Labels::Matrix(column)).unwrap(),
        )
        .unwrap(),
    );

    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
    let a = evaluate(
        context.clone(),
        EvalRequest::new(knn(3), data, Metric::accuracy()),
    );
    let b = evaluate(context, EvalRequest::new(knn(3), squeezed, Metric::accuracy()));

    assert_eq!(a.status, Status::Success);
    assert_eq!(a.result, b.result);
}

#[test]
fn test_subsample_is_deterministic_per_seed() {
    telemetry::init_test();
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
    let run = |seed| {
        let data = dataset(TaskType::Regression);
        let request = EvalRequest::new(knn(1), data, Metric::mean_absolute_error())
            .seed(seed)
            .subsample(6);
        evaluate(context.clone(), request)
    };

    let first = run(11);
    let second = run(11);
    assert_eq!(first.status, Status::Success);
    assert_eq!(first.result, second.result);
    assert_eq!(first.seed, 11);
}

#[test]
fn test_subsample_missing_a_class_still_scores_every_metric() {
    telemetry::init_test();
    let train = Split::new(
        array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]],
        Labels::Vector(array![0.0, 0.0, 0.0, 1.0, 1.0, 2.0]),
    )
    .unwrap();
    let data = Arc::new(Dataset::new("head", TaskType::MulticlassClassification, train).unwrap());
    let settings = EvaluatorSettings {
        subsample_policy: SubsamplePolicy::Head,
        ..EvaluatorSettings::default()
    };
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend))
        .with_settings(settings);
    // The first three rows are all class 0.
    let request = EvalRequest::new(knn(1), data, Metric::accuracy())
        .subsample(3)
        .all_scoring_functions(true);

    let record = evaluate(context, request);

    assert_eq!(record.status, Status::Success, "{}", record.run_info);
    assert_close(record.result, 0.5);
    let report = record.run_info.scores().unwrap();
    assert_eq!(report.len(), 7);
    assert!(report.get("log_loss").unwrap().is_finite());
}

#[test]
fn test_test_split_class_unseen_in_training() {
    telemetry::init_test();
    let train = Split::new(
        array![[0.0], [1.0], [2.0], [3.0]],
        Labels::Vector(array![0.0, 0.0, 1.0, 1.0]),
    )
    .unwrap();
    let test = Split::new(array![[0.1], [2.9]], Labels::Vector(array![0.0, 2.0])).unwrap();
    let data = Dataset::new("unseen", TaskType::MulticlassClassification, train)
        .unwrap()
        .with_test(test)
        .unwrap();
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
    let request = EvalRequest::new(knn(1), Arc::new(data), Metric::accuracy())
        .all_scoring_functions(true);

    let record = evaluate(context, request);

    assert_eq!(record.status, Status::Success, "{}", record.run_info);
    assert_close(record.result, 0.5);
    assert!(record.run_info.scores().unwrap().get("log_loss").unwrap().is_finite());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unknown_estimator_crashes() {
    telemetry::init_test();
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
    let config = Arc::new(Configuration::new().with("estimator", "gradient_boosting"));
    let request = EvalRequest::new(config, dataset(TaskType::Regression), Metric::r2()).seed(5);

    let record = evaluate(context, request);

    assert_eq!(record.status, Status::Crashed);
    assert_eq!(record.result, WORST_POSSIBLE_RESULT);
    assert_eq!(record.seed, 5);
    assert!(record.run_info.to_string().contains("gradient_boosting"));
}

#[test]
fn test_excluded_estimator_crashes() {
    telemetry::init_test();
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend));
    let request = EvalRequest::new(knn(1), dataset(TaskType::Regression), Metric::r2())
        .exclude(vec!["knn".to_string()]);

    let record = evaluate(context, request);
    assert_eq!(record.status, Status::Crashed);
    assert!(record.run_info.to_string().starts_with("configuration:"));
}

#[test]
fn test_panicking_pipeline_crashes() {
    telemetry::init_test();
    let builder = FnBuilder(|| Box::new(PanickingPipeline) as Box<dyn Pipeline>);
    let context = EvalContext::new(Arc::new(builder), Arc::new(NoopBackend));
    let request = EvalRequest::new(
        Arc::new(Configuration::new()),
        dataset(TaskType::Regression),
        Metric::r2(),
    );

    let record = evaluate(context, request);

    assert_eq!(record.status, Status::Crashed);
    assert_eq!(record.run_info.to_string(), "panic: estimator blew up");
}

#[test]
fn test_non_finite_loss_is_failure() {
    telemetry::init_test();
    let predictions = Predictions::Values(Array1::from_elem(12, f64::NAN));
    let request = EvalRequest::new(
        Arc::new(Configuration::new()),
        dataset(TaskType::Regression),
        Metric::mean_squared_error(),
    );

    let record = evaluate(fixed_context(predictions), request);

    assert_eq!(record.status, Status::Failure);
    assert_eq!(record.result, WORST_POSSIBLE_RESULT);
}

#[test]
fn test_configured_worst_result() {
    telemetry::init_test();
    let settings = EvaluatorSettings {
        worst_possible_result: 10.0,
        ..EvaluatorSettings::default()
    };
    let context = EvalContext::new(Arc::new(BaselineBuilder), Arc::new(NoopBackend))
        .with_settings(settings);
    let config = Arc::new(Configuration::new().with("n_neighbors", 0i64));
    let request = EvalRequest::new(config, dataset(TaskType::Regression), Metric::r2());

    let record = evaluate(context, request);
    assert_eq!(record.status, Status::Crashed);
    assert_eq!(record.result, 10.0);
}

#[test]
fn test_slow_pipeline_times_out() {
    telemetry::init_test();
    let builder = FnBuilder(|| {
        Box::new(SlowPipeline(Duration::from_millis(500))) as Box<dyn Pipeline>
    });
    let settings = EvaluatorSettings {
        result_timeout_ms: 20,
        ..EvaluatorSettings::default()
    };
    let context =
        EvalContext::new(Arc::new(builder), Arc::new(NoopBackend)).with_settings(settings);
    let request = EvalRequest::new(
        Arc::new(Configuration::new()),
        dataset(TaskType::Regression),
        Metric::r2(),
    )
    .seed(3);

    let record = spawn_evaluation(context, request).unwrap().wait();

    assert_eq!(record.status, Status::Timeout);
    assert_eq!(record.result, WORST_POSSIBLE_RESULT);
    assert_eq!(record.seed, 3);
}

// ============================================================================
// Persistence
// ============================================================================

fn persist(backend: Arc<RecordingBackend>, request: EvalRequest) -> ResultRecord {
    let context = EvalContext::new(Arc::new(BaselineBuilder), backend);
    evaluate(context, request)
}

fn regression_request() -> EvalRequest {
    EvalRequest::new(knn(2), dataset(TaskType::Regression), Metric::r2())
        .seed(2)
        .num_run(9)
}

#[test]
fn test_test_predictions_are_stored() {
    telemetry::init_test();
    let backend = Arc::new(RecordingBackend::default());
    let record = persist(backend.clone(), regression_request());
    assert_eq!(record.status, Status::Success);
    assert_eq!(backend.calls(), vec![(PredictionSubset::Test, 9, 2)]);
}

#[test]
fn test_optimization_predictions_are_stored_on_request() {
    telemetry::init_test();
    let backend = Arc::new(RecordingBackend::default());
    persist(backend.clone(), regression_request().output_y_hat_optimization(true));
    assert_eq!(
        backend.calls(),
        vec![
            (PredictionSubset::Test, 9, 2),
            (PredictionSubset::Optimization, 9, 2),
        ]
    );
}

#[test]
fn test_disabled_file_output_skips_backend() {
    telemetry::init_test();
    let backend = Arc::new(RecordingBackend::default());
    let record = persist(
        backend.clone(),
        regression_request()
            .output_y_hat_optimization(true)
            .disable_file_output(true),
    );
    assert_eq!(record.status, Status::Success);
    assert!(backend.calls().is_empty());
}

#[test]
fn test_backend_failure_crashes() {
    telemetry::init_test();
    let record = persist(Arc::new(RecordingBackend::failing()), regression_request());
    assert_eq!(record.status, Status::Crashed);
    assert!(record.run_info.to_string().starts_with("backend:"));
}

// ============================================================================
// Job files
// ============================================================================

#[test]
fn test_job_file_end_to_end() {
    telemetry::init_test();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("predictions");
    let job = serde_json::json!({
        "name": "toy",
        "task": "regression",
        "train": { "x": [[0.0], [1.0], [2.0], [3.0]], "y": [0.0, 1.0, 2.0, 3.0] },
        "test": { "x": [[0.1], [2.9]], "y": [0.0, 3.0] },
        "config": { "estimator": "knn", "n_neighbors": 1 },
        "metric": "mean_absolute_error",
        "seed": 4,
        "num_run": 2,
        "output_dir": output,
    });
    let path = dir.path().join("job.json");
    std::fs::write(&path, job.to_string()).unwrap();

    let job = EvalJob::load(&path).unwrap();
    let registry = MetricRegistry::standard();
    let context = EvalContext::new(Arc::new(BaselineBuilder), job.backend().unwrap())
        .with_registry(registry.clone());
    let record = spawn_evaluation(context, job.request(&registry).unwrap())
        .unwrap()
        .wait();

    assert_eq!(record.status, Status::Success);
    assert_eq!(record.result, 0.0);
    assert!(output.join("predictions_test_4_2.json").exists());
    assert!(!output.join("predictions_ensemble_4_2.json").exists());
}
