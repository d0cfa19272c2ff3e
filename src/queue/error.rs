//! Queue error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// No slot available right now. A steady-state signal, not a fault.
    #[error("Queue operation would block")]
    WouldBlock,

    #[error("Queue already has its maximum of {max} readers")]
    TooManyReaders { max: usize },

    #[error("Queue already has a writer attached")]
    WriterAttached,

    #[error("Queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("Record of {got} bytes does not match schema size {expected}")]
    SizeMismatch { expected: usize, got: usize },

    /// Batch shape outside `1 <= new <= count <= capacity`.
    #[error("Invalid batch of {count} records ({new} new) for capacity {capacity}")]
    InvalidBatch {
        count: usize,
        new: usize,
        capacity: usize,
    },
}

impl QueueError {
    #[inline]
    pub fn is_would_block(&self) -> bool {
        matches!(self, QueueError::WouldBlock)
    }
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
