//! Worker loop: cooperative round-robin over the filters of one thread.
//!
//! Each pass calls `job` on every filter whose back-off has expired. A filter
//! that reports no progress is skipped until its own `timeout` elapses; the
//! other filters on the thread keep running. When a whole pass makes no
//! progress the thread sleeps until the earliest pending attempt, capped so
//! that `halt` is noticed promptly.
//!
//! A job that panics is caught, reported as failed and its filter is taken
//! out of the rotation; the thread keeps serving the others.

use crate::filter::{Filter, JobStatus};
use crate::pipeline::event::{emit, PipelineEvent, WorkerStats};
use crate::pipeline::id::WorkerId;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Longest a worker sleeps before re-checking the running flag.
pub const MAX_IDLE_SLEEP: Duration = Duration::from_millis(10);

pub(crate) struct Task {
    pub name: String,
    pub filter: Arc<Mutex<Filter>>,
    next_attempt: Instant,
    panicked: bool,
}

impl Task {
    pub fn new(name: String, filter: Arc<Mutex<Filter>>) -> Self {
        Self {
            name,
            filter,
            next_attempt: Instant::now(),
            panicked: false,
        }
    }
}

pub(crate) fn run(
    worker: WorkerId,
    mut tasks: Vec<Task>,
    running: Arc<AtomicBool>,
    events: Sender<PipelineEvent>,
) -> WorkerStats {
    tracing::info!("{} started with {} filters", worker, tasks.len());
    emit(
        &events,
        PipelineEvent::WorkerStarted {
            worker,
            filters: tasks.iter().map(|t| t.name.clone()).collect(),
        },
    );

    let mut stats = WorkerStats::default();
    while running.load(Ordering::Acquire) {
        stats.iterations += 1;
        let mut progressed = false;
        let mut earliest: Option<Instant> = None;

        for task in tasks.iter_mut().filter(|t| !t.panicked) {
            let now = Instant::now();
            if task.next_attempt > now {
                earliest = Some(earliest.map_or(task.next_attempt, |e| e.min(task.next_attempt)));
                continue;
            }

            let (outcome, timeout) = {
                let mut filter = task.filter.lock();
                let outcome = catch_unwind(AssertUnwindSafe(|| filter.job()));
                (outcome, filter.timeout())
            };
            let result = match outcome {
                Ok(result) => result,
                Err(payload) => {
                    stats.failed_jobs += 1;
                    task.panicked = true;
                    let message = format!("job panicked: {}", panic_message(payload.as_ref()));
                    tracing::error!("{}: '{}' {}; filter removed", worker, task.name, message);
                    emit(
                        &events,
                        PipelineEvent::JobFailed {
                            worker,
                            filter: task.name.clone(),
                            message,
                        },
                    );
                    continue;
                }
            };

            match result {
                Ok(JobStatus::Progress) => {
                    stats.progress_jobs += 1;
                    progressed = true;
                    continue;
                }
                Ok(JobStatus::Idle) => {
                    stats.idle_jobs += 1;
                }
                Ok(JobStatus::Failed(message)) => {
                    stats.failed_jobs += 1;
                    tracing::debug!("{}: job of '{}' failed: {}", worker, task.name, message);
                    emit(
                        &events,
                        PipelineEvent::JobFailed {
                            worker,
                            filter: task.name.clone(),
                            message,
                        },
                    );
                }
                Err(e) => {
                    stats.failed_jobs += 1;
                    emit(
                        &events,
                        PipelineEvent::JobFailed {
                            worker,
                            filter: task.name.clone(),
                            message: e.to_string(),
                        },
                    );
                }
            }

            task.next_attempt = now + timeout;
            earliest = Some(earliest.map_or(task.next_attempt, |e| e.min(task.next_attempt)));
        }

        if !progressed {
            idle_wait(earliest);
        }
    }

    tracing::info!(
        "{} stopped after {} passes ({} productive jobs)",
        worker,
        stats.iterations,
        stats.progress_jobs
    );
    emit(
        &events,
        PipelineEvent::WorkerStopped {
            worker,
            stats: stats.clone(),
        },
    );
    stats
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

fn idle_wait(earliest: Option<Instant>) {
    let wait = earliest
        .map(|at| at.saturating_duration_since(Instant::now()))
        .unwrap_or(MAX_IDLE_SLEEP)
        .min(MAX_IDLE_SLEEP);
    if wait.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(wait);
    }
}
