//! Command-line evaluation runner.
//!
//! # Usage
//!
//! ```bash
//! # Evaluate one job and print its record as a JSON line
//! automl-eval run --job job.json
//!
//! # Same, with evaluator settings from a file
//! automl-eval run --job job.json --settings eval.toml
//!
//! # List metrics applicable to a task
//! automl-eval metrics --task regression
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use automl_eval::{
    BaselineBuilder, EvalContext, EvalJob, EvaluatorSettings, MetricRegistry, TaskType,
    spawn_evaluation,
};

/// Evaluate pipeline configurations
#[derive(Parser, Debug)]
#[command(name = "automl-eval")]
#[command(about = "Fit, score and report one pipeline configuration")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the evaluation described by a JSON job file
    Run {
        /// Job file
        #[arg(long)]
        job: PathBuf,

        /// Evaluator settings (TOML). Environment overrides still apply.
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// List registered metrics
    Metrics {
        /// Only metrics applicable to this task
        #[arg(long)]
        task: Option<TaskType>,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_default("automl-eval");

    let args = Args::parse();
    match args.command {
        Command::Run { job, settings } => run(job, settings),
        Command::Metrics { task } => {
            list_metrics(task);
            Ok(())
        }
    }
}

fn run(job_path: PathBuf, settings_path: Option<PathBuf>) -> anyhow::Result<()> {
    let settings = match &settings_path {
        Some(path) => EvaluatorSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => EvaluatorSettings::from_env()?,
    };
    let job = EvalJob::load(&job_path)
        .with_context(|| format!("loading job from {}", job_path.display()))?;

    let registry = MetricRegistry::standard();
    let request = job.request(&registry)?;
    let context = EvalContext::new(Arc::new(BaselineBuilder), job.backend()?)
        .with_registry(registry)
        .with_settings(settings);

    tracing::info!(job = %job_path.display(), dataset = %job.name, "Starting evaluation");
    let record = spawn_evaluation(context, request)?.wait();
    println!("{}", serde_json::to_string(&record)?);
    Ok(())
}

fn list_metrics(task: Option<TaskType>) {
    let registry = MetricRegistry::standard();
    for metric in registry.metrics() {
        if task.is_none_or(|t| metric.applies_to(t)) {
            println!("{}\t{:?}", metric.name(), metric.orientation());
        }
    }
}
