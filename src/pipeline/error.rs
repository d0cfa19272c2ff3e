//! Pipeline-specific error types.

use crate::filter::{ExecutionModel, FilterError};
use crate::pipeline::id::{FilterId, WorkerId};
use thiserror::Error;

/// Errors raised while building or driving a pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    #[error("Duplicate filter name: {0}")]
    DuplicateName(String),

    #[error("Filter '{filter}': {direction} port {port} out of range (max {max})")]
    PortOutOfRange {
        filter: String,
        direction: &'static str,
        port: usize,
        max: usize,
    },

    #[error("Source port {port} of '{consumer}' is already fed by '{existing}'")]
    AmbiguousBinding {
        consumer: String,
        port: usize,
        existing: String,
    },

    #[error("Cycle detected in pipeline graph")]
    CycleDetected,

    #[error("Pipeline is running; the graph cannot change")]
    AlreadyRunning,

    #[error("Filter {filter:?} is already assigned to {worker}")]
    AlreadyAssigned { filter: FilterId, worker: WorkerId },

    #[error("Filter '{filter}' runs as {model} and cannot be assigned to a worker")]
    NotSchedulable {
        filter: String,
        model: ExecutionModel,
    },

    #[error("Filter '{filter}' wants the main loop, already taken by '{existing}'")]
    MainLoopTaken { filter: String, existing: String },

    #[error("No filter runs on the main loop")]
    NoMainLoopFilter,

    #[error("Pipeline is not running")]
    NotRunning,

    #[error("Filter '{producer}' created no queue on sink port {port}")]
    MissingSinkQueue { producer: String, port: usize },

    #[error("Filter '{filter}' failed to {op}: {source}")]
    Transition {
        filter: String,
        op: &'static str,
        #[source]
        source: FilterError,
    },

    #[error("Failed to spawn {worker}: {source}")]
    Spawn {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
