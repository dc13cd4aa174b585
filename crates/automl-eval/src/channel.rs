//! Single-record result channel.
//!
//! One channel per evaluation. The sender is consumed by `send`, so a
//! producer can write at most once; the evaluator guarantees it writes at
//! least once.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::debug;

use crate::error::ChannelError;
use crate::record::ResultRecord;

/// Create a connected sender/receiver pair.
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    let (tx, rx) = channel::bounded(1);
    (ResultSender { tx }, ResultReceiver { rx })
}

/// Writing half, owned by the evaluator.
#[derive(Debug)]
pub struct ResultSender {
    tx: Sender<ResultRecord>,
}

impl ResultSender {
    /// Push the record. Never blocks: capacity is one and this is the only write.
    pub fn send(self, record: ResultRecord) -> Result<(), ChannelError> {
        self.tx.try_send(record).map_err(|_| ChannelError::ReaderGone)
    }
}

/// Reading half, owned by the caller.
#[derive(Debug, Clone)]
pub struct ResultReceiver {
    rx: Receiver<ResultRecord>,
}

impl ResultReceiver {
    /// Block until a record arrives or `timeout` elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ResultRecord, ChannelError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => ChannelError::Timeout(timeout),
            RecvTimeoutError::Disconnected => ChannelError::Disconnected,
        })
    }

    /// Take a record if one is already queued.
    pub fn try_recv(&self) -> Result<Option<ResultRecord>, ChannelError> {
        match self.rx.try_recv() {
            Ok(record) => Ok(Some(record)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Disconnected),
        }
    }
}

/// Wait up to `timeout` for the evaluation's record.
///
/// The sender writes at most once, so the first record is also the last.
pub fn get_last_result(
    receiver: &ResultReceiver,
    timeout: Duration,
) -> Result<ResultRecord, ChannelError> {
    let record = receiver.recv_timeout(timeout)?;
    debug!(seed = record.seed, status = ?record.status, "Received result");
    Ok(record)
}
