//! Pipeline: filter graph, thread assignment and lifecycle driver.
//!
//! The graph is built with [`Pipeline::add`], [`Pipeline::connect`] and
//! [`Pipeline::assign_task`]. [`Pipeline::run`] then
//!
//! 1. orders filters so producers come before consumers,
//! 2. opens every filter,
//! 3. for each filter in order, binds its sources to the queues its
//!    producers created and calls `set`,
//! 4. starts every filter and spawns one worker per distinct [`WorkerId`].
//!
//! Where a filter runs depends on its [`ExecutionModel`]. Scheduled filters
//! share the workers chosen with `assign_task`; a scheduled filter left out
//! of every assignment gets a thread of its own (with a warning when other
//! assignments exist). `OwnThread` filters always get a dedicated worker. The
//! single `MainLoop` filter runs on whichever thread calls
//! [`Pipeline::main_loop`].
//!
//! Fan-out is several edges from one producer port: every consumer gets its
//! own reader on the same queue. [`Pipeline::halt`] stops the workers, joins
//! them, and only then walks filters back down in reverse order.

pub mod error;
pub mod event;
pub mod graph;
pub mod id;
mod worker;

pub use error::{PipelineError, PipelineResult};
pub use event::{PipelineEvent, WorkerStats, EVENT_CHANNEL_CAPACITY};
pub use graph::{Edge, Graph};
pub use id::{EdgeId, FilterId, WorkerId};
pub use worker::MAX_IDLE_SLEEP;

use crate::filter::{ExecutionModel, Filter, FilterError};
use crate::settings::{read_document, write_document, SettingsResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use worker::Task;

/// A filter shared between the pipeline and its worker thread.
pub type SharedFilter = Arc<Mutex<Filter>>;

struct FilterSlot {
    name: String,
    filter: SharedFilter,
}

/// Clears the running flag shared by every worker and the main loop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Make [`Pipeline::main_loop`] and every worker return. Filters stay
    /// `Running` until [`Pipeline::halt`].
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::Acquire)
    }
}

pub struct Pipeline {
    filters: Vec<FilterSlot>,
    names: HashMap<String, FilterId>,
    graph: Graph,
    assignments: BTreeMap<WorkerId, Vec<FilterId>>,
    main_loop: Option<FilterId>,
    /// Order used by the last successful `run`, reversed on `halt`.
    active_order: Vec<FilterId>,
    live: bool,
    running: Arc<AtomicBool>,
    workers: Vec<(WorkerId, JoinHandle<WorkerStats>)>,
    event_tx: Sender<PipelineEvent>,
    event_rx: Receiver<PipelineEvent>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        Self {
            filters: Vec::new(),
            names: HashMap::new(),
            graph: Graph::new(),
            assignments: BTreeMap::new(),
            main_loop: None,
            active_order: Vec::new(),
            live: false,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            event_tx,
            event_rx,
        }
    }

    // ── Graph building ──

    /// Take ownership of `filter`. Names must be unique and at most one
    /// filter may run on the main loop.
    pub fn add(&mut self, filter: Filter) -> PipelineResult<FilterId> {
        self.ensure_stopped()?;
        let name = filter.name().to_string();
        if self.names.contains_key(&name) {
            return Err(PipelineError::DuplicateName(name));
        }
        let id = FilterId(self.filters.len() as u32);
        if filter.execution_model() == ExecutionModel::MainLoop {
            if let Some(existing) = self.main_loop {
                return Err(PipelineError::MainLoopTaken {
                    filter: name,
                    existing: self.name_of(existing).to_string(),
                });
            }
            self.main_loop = Some(id);
        }
        tracing::debug!("Added filter '{}' as {:?}", name, id);
        self.names.insert(name.clone(), id);
        self.filters.push(FilterSlot {
            name,
            filter: Arc::new(Mutex::new(filter)),
        });
        Ok(id)
    }

    /// Connect `producer`'s sink port to `consumer`'s source port.
    ///
    /// Several consumers may share one producer port (fan-out). A consumer
    /// port accepts exactly one producer.
    pub fn connect(
        &mut self,
        producer: FilterId,
        producer_port: usize,
        consumer: FilterId,
        consumer_port: usize,
    ) -> PipelineResult<EdgeId> {
        self.ensure_stopped()?;
        let producer_limits = self.slot(producer)?.filter.lock().port_limits();
        let consumer_limits = self.slot(consumer)?.filter.lock().port_limits();

        if producer_port >= producer_limits.max_sinks {
            return Err(PipelineError::PortOutOfRange {
                filter: self.name_of(producer).to_string(),
                direction: "sink",
                port: producer_port,
                max: producer_limits.max_sinks,
            });
        }
        if consumer_port >= consumer_limits.max_sources {
            return Err(PipelineError::PortOutOfRange {
                filter: self.name_of(consumer).to_string(),
                direction: "source",
                port: consumer_port,
                max: consumer_limits.max_sources,
            });
        }
        if let Some(existing) = self.graph.binding(consumer, consumer_port) {
            return Err(PipelineError::AmbiguousBinding {
                consumer: self.name_of(consumer).to_string(),
                port: consumer_port,
                existing: self.name_of(existing.producer).to_string(),
            });
        }
        if self
            .graph
            .would_create_cycle(self.filters.len(), producer, consumer)
        {
            return Err(PipelineError::CycleDetected);
        }

        let id = self
            .graph
            .add(producer, producer_port, consumer, consumer_port);
        tracing::debug!(
            "Connected {}:{} -> {}:{}",
            self.name_of(producer),
            producer_port,
            self.name_of(consumer),
            consumer_port
        );
        Ok(id)
    }

    /// [`Pipeline::connect`] addressing filters by name.
    pub fn connect_by_name(
        &mut self,
        producer: &str,
        producer_port: usize,
        consumer: &str,
        consumer_port: usize,
    ) -> PipelineResult<EdgeId> {
        let producer = self.id_of(producer)?;
        let consumer = self.id_of(consumer)?;
        self.connect(producer, producer_port, consumer, consumer_port)
    }

    /// Append `filter` to `worker`'s round-robin list. Only scheduled
    /// filters can be assigned.
    pub fn assign_task(&mut self, worker: WorkerId, filter: FilterId) -> PipelineResult<()> {
        self.ensure_stopped()?;
        let model = self.slot(filter)?.filter.lock().execution_model();
        if model != ExecutionModel::Scheduled {
            return Err(PipelineError::NotSchedulable {
                filter: self.name_of(filter).to_string(),
                model,
            });
        }
        if let Some((&owner, _)) = self
            .assignments
            .iter()
            .find(|(_, filters)| filters.contains(&filter))
        {
            return Err(PipelineError::AlreadyAssigned {
                filter,
                worker: owner,
            });
        }
        self.assignments.entry(worker).or_default().push(filter);
        Ok(())
    }

    // ── Accessors ──

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn id_of(&self, name: &str) -> PipelineResult<FilterId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::UnknownFilter(name.to_string()))
    }

    /// Shared handle to a filter; lock it to read state or change settings.
    pub fn filter(&self, id: FilterId) -> Option<&SharedFilter> {
        self.filters.get(id.index()).map(|s| &s.filter)
    }

    pub fn filter_by_name(&self, name: &str) -> Option<&SharedFilter> {
        self.filter(*self.names.get(name)?)
    }

    pub fn filter_name(&self, id: FilterId) -> Option<&str> {
        self.filters.get(id.index()).map(|s| s.name.as_str())
    }

    /// Filter ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = FilterId> {
        (0..self.filters.len() as u32).map(FilterId)
    }

    /// Explicit thread assignments made with [`Pipeline::assign_task`].
    pub fn assignments(&self) -> &BTreeMap<WorkerId, Vec<FilterId>> {
        &self.assignments
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn is_running(&self) -> bool {
        self.live
    }

    /// Handle that ends the main loop and the workers from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// The filter [`Pipeline::main_loop`] drives, if any.
    pub fn main_loop_filter(&self) -> Option<FilterId> {
        self.main_loop
    }

    /// Receiver of worker notifications.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.event_rx.clone()
    }

    /// Thread assignment `run` will use: the explicit assignments, plus a
    /// fresh worker for every unassigned scheduled filter and every
    /// `OwnThread` filter. Fresh worker ids follow the highest explicit one.
    /// The main-loop filter appears nowhere.
    pub fn effective_assignments(&self) -> BTreeMap<WorkerId, Vec<FilterId>> {
        let mut plan = self.assignments.clone();
        let mut next = plan.keys().next_back().map_or(0, |w| w.0.saturating_add(1));
        for id in self.ids() {
            let dedicated = match self.filters[id.index()].filter.lock().execution_model() {
                ExecutionModel::MainLoop => false,
                ExecutionModel::OwnThread => true,
                ExecutionModel::Scheduled => !self.is_assigned(id),
            };
            if dedicated {
                plan.insert(WorkerId(next), vec![id]);
                next = next.saturating_add(1);
            }
        }
        plan
    }

    /// Scheduled filters missing from a non-empty explicit assignment.
    pub fn unassigned_filters(&self) -> Vec<FilterId> {
        if self.assignments.is_empty() {
            return Vec::new();
        }
        self.ids()
            .filter(|&id| {
                !self.is_assigned(id)
                    && self.filters[id.index()].filter.lock().execution_model()
                        == ExecutionModel::Scheduled
            })
            .collect()
    }

    fn is_assigned(&self, id: FilterId) -> bool {
        self.assignments.values().any(|filters| filters.contains(&id))
    }

    // ── Lifecycle ──

    /// Drive every filter through open → set → start and spawn the workers.
    ///
    /// On any failure the filters already brought up are shut down again and
    /// no worker is left running.
    pub fn run(&mut self) -> PipelineResult<()> {
        self.ensure_stopped()?;
        let order = self.graph.topological_order(self.filters.len())?;

        self.active_order = order.clone();
        if let Err(e) = self.bring_up(&order) {
            self.shut_down_filters();
            return Err(e);
        }

        let unassigned = self.unassigned_filters();
        if !unassigned.is_empty() {
            let names: Vec<&str> = unassigned.iter().map(|&id| self.name_of(id)).collect();
            tracing::warn!(
                "Filters without a worker assignment get a thread each: {}",
                names.join(", ")
            );
        }

        self.live = true;
        self.running.store(true, Ordering::Release);
        for (worker, ids) in self.effective_assignments() {
            let tasks = ids
                .iter()
                .map(|&id| {
                    let slot = &self.filters[id.index()];
                    Task::new(slot.name.clone(), Arc::clone(&slot.filter))
                })
                .collect();
            let running = Arc::clone(&self.running);
            let events = self.event_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("dataflow-{}", worker))
                .spawn(move || worker::run(worker, tasks, running, events));
            match spawned {
                Ok(handle) => self.workers.push((worker, handle)),
                Err(source) => {
                    self.halt();
                    return Err(PipelineError::Spawn { worker, source });
                }
            }
        }

        tracing::info!(
            "Pipeline running: {} filters on {} workers",
            self.filters.len(),
            self.workers.len()
        );
        if let Some(id) = self.main_loop {
            tracing::info!("Filter '{}' waits for the main loop", self.name_of(id));
        }
        Ok(())
    }

    /// Run the main-loop filter's jobs on the calling thread until a
    /// [`StopHandle`] or [`Pipeline::halt`] clears the running flag.
    pub fn main_loop(&self) -> PipelineResult<WorkerStats> {
        if !self.live {
            return Err(PipelineError::NotRunning);
        }
        let id = self.main_loop.ok_or(PipelineError::NoMainLoopFilter)?;
        let slot = &self.filters[id.index()];
        let tasks = vec![Task::new(slot.name.clone(), Arc::clone(&slot.filter))];
        Ok(worker::run(
            WorkerId::MAIN_LOOP,
            tasks,
            Arc::clone(&self.running),
            self.event_tx.clone(),
        ))
    }

    fn bring_up(&self, order: &[FilterId]) -> PipelineResult<()> {
        for &id in order {
            self.transition(id, "open", Filter::open)?;
        }

        for &id in order {
            // Producers precede `id` in `order`, so their queues exist.
            for edge in self.graph.inputs_of(id) {
                let producer = &self.filters[edge.producer.index()];
                let queue = producer
                    .filter
                    .lock()
                    .sink_queue(edge.producer_port)
                    .ok_or_else(|| PipelineError::MissingSinkQueue {
                        producer: producer.name.clone(),
                        port: edge.producer_port,
                    })?;
                let mut consumer = self.filters[id.index()].filter.lock();
                consumer
                    .bind_source(edge.consumer_port, &queue, producer.name.clone())
                    .map_err(|source| self.transition_error(id, "bind source", source))?;
            }
            self.transition(id, "set", Filter::set)?;
        }

        for &id in order {
            self.transition(id, "start", Filter::start)?;
        }
        Ok(())
    }

    fn transition(
        &self,
        id: FilterId,
        op: &'static str,
        step: fn(&mut Filter) -> Result<(), FilterError>,
    ) -> PipelineResult<()> {
        let mut filter = self.filters[id.index()].filter.lock();
        step(&mut filter).map_err(|source| self.transition_error(id, op, source))
    }

    fn transition_error(&self, id: FilterId, op: &'static str, source: FilterError) -> PipelineError {
        PipelineError::Transition {
            filter: self.name_of(id).to_string(),
            op,
            source,
        }
    }

    /// Stop all workers, join them, then stop → reset → close every filter in
    /// reverse order. Calling it again, or before `run`, does nothing.
    pub fn halt(&mut self) {
        if !self.live && self.active_order.is_empty() {
            return;
        }
        self.live = false;
        self.running.store(false, Ordering::Release);
        for (worker, handle) in self.workers.drain(..) {
            match handle.join() {
                Ok(stats) => tracing::debug!("{} joined: {:?}", worker, stats),
                Err(_) => tracing::error!("{} panicked", worker),
            }
        }
        self.shut_down_filters();
        tracing::info!("Pipeline halted");
    }

    fn shut_down_filters(&mut self) {
        for id in self.active_order.drain(..).rev() {
            self.filters[id.index()].filter.lock().shutdown();
        }
    }

    // ── Settings ──

    /// `{ "filters": [ record, ... ] }` for every filter, in insertion order.
    pub fn save_settings(&self) -> Value {
        let records: Vec<Value> = self
            .filters
            .iter()
            .map(|s| s.filter.lock().save_settings())
            .collect();
        serde_json::json!({ "filters": records })
    }

    /// Apply records from a `save_settings` document, matched by `name`.
    /// Returns the number of settings applied.
    pub fn load_settings(&self, doc: &Value) -> usize {
        let Some(records) = doc.get("filters").and_then(Value::as_array) else {
            return 0;
        };
        let mut applied = 0;
        for record in records {
            let Some(name) = record.get("name").and_then(Value::as_str) else {
                continue;
            };
            match self.filter_by_name(name) {
                Some(filter) => applied += filter.lock().load_settings(record),
                None => tracing::warn!("Settings for unknown filter '{}' ignored", name),
            }
        }
        applied
    }

    pub fn persist_settings(&self, path: impl AsRef<Path>) -> SettingsResult<()> {
        write_document(path.as_ref(), &self.save_settings())
    }

    pub fn restore_settings(&self, path: impl AsRef<Path>) -> SettingsResult<usize> {
        let doc = read_document(path.as_ref())?;
        Ok(self.load_settings(&doc))
    }

    // ── Helpers ──

    fn ensure_stopped(&self) -> PipelineResult<()> {
        if self.is_running() {
            Err(PipelineError::AlreadyRunning)
        } else {
            Ok(())
        }
    }

    fn slot(&self, id: FilterId) -> PipelineResult<&FilterSlot> {
        self.filters
            .get(id.index())
            .ok_or_else(|| PipelineError::UnknownFilter(format!("{:?}", id)))
    }

    fn name_of(&self, id: FilterId) -> &str {
        self.filters
            .get(id.index())
            .map_or("<unknown>", |s| s.name.as_str())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.halt();
    }
}
