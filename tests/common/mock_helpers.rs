//! Mock filter plugins

use dataflow_rs::{
    DataNode, FilterContext, FilterPlugin, JobStatus, Message, PortLimits, QueueError,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Writes 0, 1, 2, ... as `u32` on sink 0, up to `limit` records.
pub struct CountingSource {
    next: u32,
    limit: u32,
}

impl CountingSource {
    pub fn new(limit: u32) -> Self {
        Self { next: 0, limit }
    }

    pub fn schema() -> Message {
        Message::new().with(DataNode::scalar::<u32>("count"))
    }
}

impl FilterPlugin for CountingSource {
    fn type_name(&self) -> &'static str {
        "CountingSource"
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::source_only(1)
    }

    fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        ctx.create_sink_queue(0, Self::schema())?;
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        if self.next >= self.limit {
            return JobStatus::Idle;
        }
        let Some(writer) = ctx.writer(0) else {
            return JobStatus::Failed("no writer".into());
        };
        match writer.try_push(&self.next.to_le_bytes()) {
            Ok(_) => {
                self.next += 1;
                JobStatus::Progress
            }
            Err(QueueError::WouldBlock) => JobStatus::Idle,
            Err(e) => JobStatus::Failed(e.to_string()),
        }
    }

    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {
        self.next = 0;
    }
}

/// Records received `(source port, value)` pairs, shared with the test.
pub type Received = Arc<Mutex<Vec<(usize, u32)>>>;

/// Reads `u32` records from every connected source.
pub struct Collector {
    received: Received,
    sources: usize,
}

impl Collector {
    pub fn new(sources: usize) -> (Self, Received) {
        let received = Received::default();
        (
            Self {
                received: Arc::clone(&received),
                sources,
            },
            received,
        )
    }
}

impl FilterPlugin for Collector {
    fn type_name(&self) -> &'static str {
        "Collector"
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::sink_only(self.sources)
    }

    fn on_set(&mut self, _ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        let mut status = JobStatus::Idle;
        let mut buf = Vec::new();
        for port in ctx.connected_sources() {
            let Some(reader) = ctx.reader(port) else {
                continue;
            };
            if reader.try_pop_into(&mut buf).is_ok() {
                let value = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
                self.received.lock().push((port, value));
                status = JobStatus::Progress;
            }
        }
        status
    }
}
