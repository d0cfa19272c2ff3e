//! Schema model describing the binary layout of one queue record.
//!
//! - [`DataNode`]: named, typed, shaped leaf field
//! - [`SchemaNode`]: tagged variant over a leaf or a composite [`Group`]
//! - [`Message`]: ordered record schema with an optional header schema
//!
//! Schemas are built by a filter during `set` and handed to
//! [`Queue::new`](crate::queue::Queue::new), which binds every queued leaf to
//! a byte [`Region`] of the slot. After that the schema is immutable.

pub mod image;
pub mod message;
pub mod node;

pub use image::{image_group, ImageFields, ImageInfo};
pub use message::{Group, GroupKind, Message, SchemaNode};
pub use node::{DataNode, Region};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema item {index} out of range ({len} items)")]
    OutOfRange { index: usize, len: usize },

    #[error("Schema node not found: {0}")]
    NotFound(String),

    #[error("Invalid schema shape: {0}")]
    InvalidShape(String),
}
