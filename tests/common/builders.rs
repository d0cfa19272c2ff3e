//! Test data builders for creating test objects

use dataflow_rs::{DataNode, Element, Message, Queue, QueueKind};
use std::sync::Arc;

/// Builder for creating test queues
pub struct QueueBuilder {
    name: String,
    schema: Message,
    capacity: usize,
    max_readers: usize,
    kind: QueueKind,
}

impl QueueBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            schema: Message::new(),
            capacity: 10,
            max_readers: 5,
            kind: QueueKind::Fifo,
        }
    }

    pub fn field<T: Element>(mut self, name: &str) -> Self {
        self.schema.add_item(DataNode::scalar::<T>(name));
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn max_readers(mut self, max_readers: usize) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn kind(mut self, kind: QueueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn build(self) -> Arc<Queue> {
        let schema = if self.schema.is_empty() {
            Message::new().with(DataNode::scalar::<i32>("value"))
        } else {
            self.schema
        };
        Queue::with_kind(self.name, schema, self.capacity, self.max_readers, self.kind).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_builder() {
        let queue = QueueBuilder::new("test")
            .field::<u16>("a")
            .field::<f64>("b")
            .capacity(3)
            .build();

        assert_eq!(queue.name(), "test");
        assert_eq!(queue.capacity(), 3);
        assert_eq!(queue.schema().size(), 10);
        assert!(queue.schema().is_bound());
    }
}
