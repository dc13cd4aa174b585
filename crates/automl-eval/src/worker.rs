//! Running evaluations on worker threads.
//!
//! Each evaluation gets its own thread and its own result channel. The
//! caller waits on the channel with the configured timeout; a worker that
//! never reports is left running and a timeout record is synthesized.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::channel::{ResultReceiver, get_last_result, result_channel};
use crate::error::{ChannelError, Result};
use crate::evaluator::{EvalContext, EvalRequest, eval_test};
use crate::record::ResultRecord;

/// Handle to an evaluation running on a worker thread.
#[derive(Debug)]
pub struct EvaluationHandle {
    receiver: ResultReceiver,
    thread: JoinHandle<()>,
    seed: u64,
    worst_possible_result: f64,
    timeout: Duration,
    started: Instant,
}

/// Start `request` on a new named thread.
pub fn spawn_evaluation(context: EvalContext, request: EvalRequest) -> Result<EvaluationHandle> {
    let (sender, receiver) = result_channel();
    let seed = request.seed;
    let worst_possible_result = context.settings.worst_possible_result;
    let timeout = context.settings.result_timeout();
    let name = format!("eval-{}-{}", seed, request.num_run);

    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || eval_test(context, request, sender))?;

    Ok(EvaluationHandle {
        receiver,
        thread,
        seed,
        worst_possible_result,
        timeout,
        started: Instant::now(),
    })
}

impl EvaluationHandle {
    /// Receiving side of this evaluation's channel.
    pub fn receiver(&self) -> &ResultReceiver {
        &self.receiver
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the record until the configured result timeout, counted from
    /// spawn, runs out.
    pub fn wait(self) -> ResultRecord {
        let remaining = self.timeout.saturating_sub(self.started.elapsed());
        self.wait_timeout(remaining)
    }

    /// Wait up to `timeout` for the record.
    ///
    /// Never fails: a missing record becomes a `Timeout` record and a worker
    /// that exits without reporting becomes a `Crashed` record. Either way
    /// the record's duration is the time since spawn.
    pub fn wait_timeout(self, timeout: Duration) -> ResultRecord {
        match get_last_result(&self.receiver, timeout) {
            Ok(record) => {
                if self.thread.join().is_err() {
                    warn!(seed = self.seed, "Worker panicked after reporting");
                }
                record
            }
            Err(ChannelError::Timeout(limit)) => {
                let waited = self.started.elapsed();
                warn!(seed = self.seed, ?limit, ?waited, "Evaluation timed out");
                ResultRecord::timeout(waited, self.worst_possible_result, self.seed)
            }
            Err(err) => {
                warn!(seed = self.seed, error = %err, "Worker exited without a record");
                ResultRecord::crashed(
                    self.started.elapsed().as_secs_f64(),
                    self.worst_possible_result,
                    self.seed,
                    format!("worker: {}", err),
                )
            }
        }
    }
}

/// Run every request concurrently and collect records in request order.
///
/// All evaluations share one deadline: the result timeout after they were
/// spawned.
pub fn evaluate_all(
    context: &EvalContext,
    requests: impl IntoIterator<Item = EvalRequest>,
) -> Result<Vec<ResultRecord>> {
    let handles = requests
        .into_iter()
        .map(|request| spawn_evaluation(context.clone(), request))
        .collect::<Result<Vec<_>>>()?;
    debug!(count = handles.len(), "Spawned evaluations");
    Ok(handles.into_iter().map(EvaluationHandle::wait).collect())
}
