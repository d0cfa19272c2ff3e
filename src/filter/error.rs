//! Filter-specific error types.

use crate::filter::FilterState;
use crate::queue::QueueError;
use crate::schema::SchemaError;
use crate::settings::SettingsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Filter '{filter}': cannot {op} while {state}")]
    InvalidState {
        filter: String,
        op: &'static str,
        state: FilterState,
    },

    #[error("Filter '{filter}' requires at least one connected source")]
    MissingSource { filter: String },

    #[error("Filter '{filter}': {direction} port {port} out of range (max {max})")]
    PortOutOfRange {
        filter: String,
        direction: &'static str,
        port: usize,
        max: usize,
    },

    #[error("Filter '{filter}': {direction} port {port} is already bound")]
    PortInUse {
        filter: String,
        direction: &'static str,
        port: usize,
    },

    #[error("Filter '{filter}' failed to {op}: {source}")]
    Hook {
        filter: String,
        op: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

pub type FilterResult<T> = std::result::Result<T, FilterError>;
