//! Notifications published by worker threads.

use crate::pipeline::id::WorkerId;
use crossbeam_channel::Sender;

/// Capacity of the event channel; events beyond it are dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    WorkerStarted {
        worker: WorkerId,
        filters: Vec<String>,
    },
    WorkerStopped {
        worker: WorkerId,
        stats: WorkerStats,
    },
    /// A job reported `Failed` or returned an error.
    JobFailed {
        worker: WorkerId,
        filter: String,
        message: String,
    },
}

/// Counters a worker reports when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub iterations: u64,
    pub progress_jobs: u64,
    pub idle_jobs: u64,
    pub failed_jobs: u64,
}

/// Non-blocking publish: a full or disconnected channel drops the event.
pub(crate) fn emit(tx: &Sender<PipelineEvent>, event: PipelineEvent) {
    if tx.try_send(event).is_err() {
        tracing::trace!("Pipeline event dropped");
    }
}
