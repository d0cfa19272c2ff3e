//! Sink and source ports of a filter.
//!
//! A sink port owns the queue its filter creates during `set` together with
//! the writer handle. A source port holds a reader on a queue created by an
//! upstream filter; the queue itself is shared, never owned.

use crate::queue::{
    Queue, QueueKind, QueueReader, QueueResult, QueueWriter, DEFAULT_MAX_READERS,
    DEFAULT_QUEUE_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Port counts a filter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLimits {
    pub max_sources: usize,
    pub max_sinks: usize,
}

impl PortLimits {
    pub const fn new(max_sources: usize, max_sinks: usize) -> Self {
        Self {
            max_sources,
            max_sinks,
        }
    }

    /// Produces data only.
    pub const fn source_only(max_sinks: usize) -> Self {
        Self::new(0, max_sinks)
    }

    /// Consumes data only.
    pub const fn sink_only(max_sources: usize) -> Self {
        Self::new(max_sources, 0)
    }
}

/// Shape of the queue created behind one sink port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkQueueSettings {
    /// Slot count.
    #[serde(default = "default_length")]
    pub length: usize,
    #[serde(default = "default_max_readers")]
    pub max_readers: usize,
    #[serde(default, rename = "type")]
    pub kind: QueueKind,
    /// Records the filter reserves per write.
    #[serde(default = "default_batch")]
    pub batch: usize,
}

fn default_length() -> usize {
    DEFAULT_QUEUE_LENGTH
}

fn default_max_readers() -> usize {
    DEFAULT_MAX_READERS
}

fn default_batch() -> usize {
    1
}

impl Default for SinkQueueSettings {
    fn default() -> Self {
        Self {
            length: DEFAULT_QUEUE_LENGTH,
            max_readers: DEFAULT_MAX_READERS,
            kind: QueueKind::default(),
            batch: 1,
        }
    }
}

/// Window a source port reads from its upstream queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceQueueSettings {
    /// Records per window.
    #[serde(default = "default_batch")]
    pub batch: usize,
    /// Records of each window not seen in the previous one.
    #[serde(default = "default_batch")]
    pub new_per_batch: usize,
}

impl Default for SourceQueueSettings {
    fn default() -> Self {
        Self {
            batch: 1,
            new_per_batch: 1,
        }
    }
}

impl SourceQueueSettings {
    pub const fn window(batch: usize, new_per_batch: usize) -> Self {
        Self {
            batch,
            new_per_batch,
        }
    }

    pub(crate) fn apply(&self, reader: &mut QueueReader) -> QueueResult<()> {
        reader.set_batch(self.batch, self.new_per_batch)
    }
}

#[derive(Debug, Default)]
pub struct SinkPort {
    pub(crate) settings: SinkQueueSettings,
    pub(crate) queue: Option<Arc<Queue>>,
    pub(crate) writer: Option<QueueWriter>,
}

impl SinkPort {
    pub fn settings(&self) -> SinkQueueSettings {
        self.settings
    }

    pub fn queue(&self) -> Option<&Arc<Queue>> {
        self.queue.as_ref()
    }

    pub fn writer(&mut self) -> Option<&mut QueueWriter> {
        self.writer.as_mut()
    }

    pub fn is_created(&self) -> bool {
        self.queue.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.writer = None;
        self.queue = None;
    }
}

#[derive(Debug, Default)]
pub struct SourcePort {
    pub(crate) settings: SourceQueueSettings,
    pub(crate) upstream: Option<String>,
    pub(crate) reader: Option<QueueReader>,
}

impl SourcePort {
    pub fn settings(&self) -> SourceQueueSettings {
        self.settings
    }

    /// Name of the filter feeding this port.
    pub fn upstream(&self) -> Option<&str> {
        self.upstream.as_deref()
    }

    pub fn reader(&mut self) -> Option<&mut QueueReader> {
        self.reader.as_mut()
    }

    pub fn is_bound(&self) -> bool {
        self.reader.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.reader = None;
        self.upstream = None;
    }
}
