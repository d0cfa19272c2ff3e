//! Filter lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `Closed → Opened → Configured → Running`, walked back in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterState {
    #[default]
    Closed,
    Opened,
    Configured,
    Running,
}

impl FilterState {
    pub const ALL: [FilterState; 4] = [
        FilterState::Closed,
        FilterState::Opened,
        FilterState::Configured,
        FilterState::Running,
    ];

    /// State reached by the next transition down, if any.
    pub fn below(self) -> Option<FilterState> {
        match self {
            FilterState::Closed => None,
            FilterState::Opened => Some(FilterState::Closed),
            FilterState::Configured => Some(FilterState::Opened),
            FilterState::Running => Some(FilterState::Configured),
        }
    }
}

impl fmt::Display for FilterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterState::Closed => "closed",
            FilterState::Opened => "opened",
            FilterState::Configured => "configured",
            FilterState::Running => "running",
        };
        f.write_str(s)
    }
}

/// Where a filter's jobs run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    /// Time-sliced on a pool worker chosen by `assign_task`.
    #[default]
    Scheduled,
    /// Alone on a dedicated worker thread.
    OwnThread,
    /// On the thread that calls `Pipeline::main_loop`. At most one per pipeline.
    MainLoop,
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionModel::Scheduled => "scheduled",
            ExecutionModel::OwnThread => "own_thread",
            ExecutionModel::MainLoop => "main_loop",
        };
        f.write_str(s)
    }
}

/// Outcome of one `job` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// At least one record was read or written.
    Progress,
    /// Nothing to do; back off for the filter's timeout.
    Idle,
    /// The attempt failed; the scheduler reports it and backs off.
    Failed(String),
}

impl JobStatus {
    pub fn made_progress(&self) -> bool {
        matches!(self, JobStatus::Progress)
    }
}
