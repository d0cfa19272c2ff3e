//! The collaborator contract implemented by every concrete filter.
//!
//! [`Filter`](crate::filter::Filter) owns the lifecycle and calls these hooks
//! only from the matching state. Hooks get a [`FilterContext`] giving access
//! to the filter's ports and settings.

use crate::filter::error::{FilterError, FilterResult};
use crate::filter::port::{PortLimits, SinkPort, SinkQueueSettings, SourcePort};
use crate::filter::state::{ExecutionModel, FilterState, JobStatus};
use crate::queue::{Queue, QueueError, QueueReader, QueueWriter};
use crate::schema::Message;
use crate::settings::{Settings, SettingsResult};
use std::sync::Arc;

/// Per-call view of a filter's ports and settings.
pub struct FilterContext<'a> {
    pub(crate) name: &'a str,
    pub(crate) state: FilterState,
    pub(crate) sinks: &'a mut [SinkPort],
    pub(crate) sources: &'a mut [SourcePort],
    pub(crate) settings: &'a mut Settings,
}

impl<'a> FilterContext<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    pub fn settings(&self) -> &Settings {
        &*self.settings
    }

    /// Used by `on_open` to register DEVICE settings.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut *self.settings
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    // ── Sinks ──

    /// Create the queue behind sink `port` from `schema` and take its writer.
    ///
    /// Must be called from `on_set`; each port can be created once per `set`.
    /// Fails if the port's write batch does not fit the queue.
    pub fn create_sink_queue(&mut self, port: usize, schema: Message) -> FilterResult<Arc<Queue>> {
        let max = self.sinks.len();
        let name = self.name;
        let sink = self
            .sinks
            .get_mut(port)
            .ok_or_else(|| FilterError::PortOutOfRange {
                filter: name.to_string(),
                direction: "sink",
                port,
                max,
            })?;
        if sink.is_created() {
            return Err(FilterError::PortInUse {
                filter: name.to_string(),
                direction: "sink",
                port,
            });
        }
        if sink.settings.batch == 0 || sink.settings.batch > sink.settings.length {
            return Err(QueueError::InvalidBatch {
                count: sink.settings.batch,
                new: sink.settings.batch,
                capacity: sink.settings.length,
            }
            .into());
        }
        let queue = Queue::with_kind(
            format!("{}.sink{}", name, port),
            schema,
            sink.settings.length,
            sink.settings.max_readers,
            sink.settings.kind,
        )?;
        sink.writer = Some(queue.attach_writer()?);
        sink.queue = Some(Arc::clone(&queue));
        Ok(queue)
    }

    /// Configured shape of sink `port`, including the write batch size.
    pub fn sink_settings(&self, port: usize) -> Option<SinkQueueSettings> {
        self.sinks.get(port).map(SinkPort::settings)
    }

    pub fn sink_queue(&self, port: usize) -> Option<&Arc<Queue>> {
        self.sinks.get(port)?.queue()
    }

    /// Bound schema of sink `port`.
    pub fn sink_schema(&self, port: usize) -> Option<&Message> {
        self.sink_queue(port).map(|q| q.schema())
    }

    pub fn writer(&mut self, port: usize) -> Option<&mut QueueWriter> {
        self.sinks.get_mut(port)?.writer()
    }

    // ── Sources ──

    pub fn reader(&mut self, port: usize) -> Option<&mut QueueReader> {
        self.sources.get_mut(port)?.reader()
    }

    /// Bound schema of the queue feeding source `port`.
    pub fn source_schema(&self, port: usize) -> Option<&Message> {
        self.sources
            .get(port)?
            .reader
            .as_ref()
            .map(|r| r.schema())
    }

    /// Indices of source ports with a bound reader.
    pub fn connected_sources(&self) -> Vec<usize> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_bound())
            .map(|(i, _)| i)
            .collect()
    }

    /// Reader of source `source` and writer of sink `sink` at once.
    pub fn reader_and_writer(
        &mut self,
        source: usize,
        sink: usize,
    ) -> (Option<&mut QueueReader>, Option<&mut QueueWriter>) {
        let reader = self.sources.get_mut(source).and_then(SourcePort::reader);
        let writer = self.sinks.get_mut(sink).and_then(SinkPort::writer);
        (reader, writer)
    }
}

/// Hooks a concrete filter implements.
///
/// Forward hooks may fail; the filter then stays in its previous state.
/// Reverse hooks (`on_stop`, `on_reset`, `on_close`) cannot fail so that
/// shutdown is always reachable.
pub trait FilterPlugin: Send {
    /// Type name used in configuration documents.
    fn type_name(&self) -> &'static str;

    fn port_limits(&self) -> PortLimits;

    /// Where the pipeline runs this filter's jobs.
    fn execution_model(&self) -> ExecutionModel {
        ExecutionModel::Scheduled
    }

    /// Whether `set` needs at least one bound source.
    fn requires_sources(&self) -> bool {
        self.port_limits().max_sources > 0
    }

    /// Register FILTER settings and commands. Called once at construction.
    fn register_settings(&mut self, _settings: &mut Settings) -> SettingsResult<()> {
        Ok(())
    }

    /// Acquire external resources; may register DEVICE settings.
    fn on_open(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Build sink schemas and create every sink queue this filter will use.
    fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()>;

    /// Cache bound schema nodes for the job loop.
    fn on_start(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// One bounded, non-blocking unit of work.
    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus;

    fn on_stop(&mut self, _ctx: &mut FilterContext<'_>) {}

    /// Drop schema-derived state; the core destroys the queues afterwards.
    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {}

    /// Release external resources. DEVICE settings are removed afterwards.
    fn on_close(&mut self, _ctx: &mut FilterContext<'_>) {}
}
