//! Copies every record from source `i` to sink `i`.

use crate::filter::{FilterContext, FilterPlugin, JobStatus, PortLimits};
use crate::queue::QueueError;

/// Default port count in each direction.
pub const PASSTHROUGH_PORTS: usize = 4;

/// Mirrors each connected source's schema onto the sink with the same index
/// and forwards records unchanged, header included.
///
/// A record is only consumed once the matching sink has room for it, so a
/// slow downstream reader throttles the upstream queue instead of losing data.
#[derive(Debug, Default)]
pub struct Passthrough {
    ports: Vec<usize>,
}

impl Passthrough {
    pub const TYPE_NAME: &'static str = "Passthrough";

    pub fn new() -> Self {
        Self::default()
    }

    fn forward(ctx: &mut FilterContext<'_>, port: usize) -> Result<bool, QueueError> {
        let (Some(reader), Some(writer)) = ctx.reader_and_writer(port, port) else {
            return Ok(false);
        };
        let input = match reader.start_read() {
            Ok(slot) => slot,
            Err(QueueError::WouldBlock) => return Ok(false),
            Err(e) => return Err(e),
        };
        let mut output = match writer.start_write() {
            Ok(slot) => slot,
            // Leave the record unread; dropping `input` aborts the read.
            Err(QueueError::WouldBlock) => return Ok(false),
            Err(e) => return Err(e),
        };
        output.data_mut().copy_from_slice(input.data());
        output.header_mut().copy_from_slice(input.header());
        output.end_write();
        input.end_read();
        Ok(true)
    }
}

impl FilterPlugin for Passthrough {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn port_limits(&self) -> PortLimits {
        PortLimits::new(PASSTHROUGH_PORTS, PASSTHROUGH_PORTS)
    }

    fn on_set(&mut self, ctx: &mut FilterContext<'_>) -> anyhow::Result<()> {
        let ports = ctx.connected_sources();
        for &port in &ports {
            if port >= ctx.sink_count() {
                anyhow::bail!(
                    "source port {} has no matching sink ({} sinks)",
                    port,
                    ctx.sink_count()
                );
            }
            let schema = ctx
                .source_schema(port)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("source port {} lost its queue", port))?;
            ctx.create_sink_queue(port, schema)?;
        }
        self.ports = ports;
        Ok(())
    }

    fn job(&mut self, ctx: &mut FilterContext<'_>) -> JobStatus {
        let mut status = JobStatus::Idle;
        for &port in &self.ports {
            match Self::forward(ctx, port) {
                Ok(true) => status = JobStatus::Progress,
                Ok(false) => {}
                Err(e) => return JobStatus::Failed(format!("port {}: {}", port, e)),
            }
        }
        status
    }

    fn on_reset(&mut self, _ctx: &mut FilterContext<'_>) {
        self.ports.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;
    use crate::queue::Queue;
    use crate::schema::{DataNode, Message};

    #[test]
    fn test_forwards_records_in_order() {
        let upstream = Queue::new(
            "up",
            Message::new().with(DataNode::scalar::<u16>("x")),
            4,
            2,
        )
        .unwrap();
        let mut writer = upstream.attach_writer().unwrap();

        let mut filter = Filter::new("pass", Passthrough::new()).unwrap();
        filter.open().unwrap();
        filter.bind_source(0, &upstream, "up").unwrap();
        filter.set().unwrap();
        filter.start().unwrap();

        let downstream = filter.sink_queue(0).unwrap();
        assert_eq!(downstream.schema(), upstream.schema());
        assert!(filter.sink_queue(1).is_none());
        let mut reader = downstream.attach_reader().unwrap();

        assert_eq!(filter.job().unwrap(), JobStatus::Idle);
        for x in [7u16, 8, 9] {
            writer.try_push(&x.to_le_bytes()).unwrap();
        }
        for _ in 0..3 {
            assert_eq!(filter.job().unwrap(), JobStatus::Progress);
        }

        let mut buf = Vec::new();
        for expected in [7u16, 8, 9] {
            reader.try_pop_into(&mut buf).unwrap();
            assert_eq!(buf, expected.to_le_bytes());
        }
    }

    #[test]
    fn test_full_sink_leaves_record_upstream() {
        let upstream = Queue::new("up", Message::new().with(DataNode::scalar::<u8>("b")), 4, 1)
            .unwrap();
        let mut writer = upstream.attach_writer().unwrap();

        let mut filter = Filter::new("pass", Passthrough::new()).unwrap();
        filter
            .set_sink_queue_settings(
                0,
                crate::filter::SinkQueueSettings {
                    length: 1,
                    max_readers: 1,
                    ..Default::default()
                },
            )
            .unwrap();
        filter.open().unwrap();
        filter.bind_source(0, &upstream, "up").unwrap();
        filter.set().unwrap();
        filter.start().unwrap();
        let mut reader = filter.sink_queue(0).unwrap().attach_reader().unwrap();

        writer.try_push(&[1]).unwrap();
        writer.try_push(&[2]).unwrap();
        assert_eq!(filter.job().unwrap(), JobStatus::Progress);
        assert_eq!(filter.job().unwrap(), JobStatus::Idle);

        let mut buf = Vec::new();
        reader.try_pop_into(&mut buf).unwrap();
        assert_eq!(buf, [1]);
        assert_eq!(filter.job().unwrap(), JobStatus::Progress);
        reader.try_pop_into(&mut buf).unwrap();
        assert_eq!(buf, [2]);
    }
}
