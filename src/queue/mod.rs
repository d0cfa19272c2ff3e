//! Bounded slot queue shared between one writer and many readers.
//!
//! The slot array is allocated once from the record schema. Sequence numbers
//! drive everything:
//!
//! - `write_seq` counts published records; slot `seq % capacity` holds record `seq`.
//! - every attached reader owns a cursor (the next sequence it has not seen)
//!   and a floor (the oldest sequence it still needs; below the cursor only
//!   when the reader keeps a sliding window of older records).
//! - the writer may reserve `seq` only while `seq - min(active floors) < capacity`,
//!   so a slot is reused only after every reader has released it.
//! - a reader may acquire `seq` only while `seq < write_seq`.
//!
//! A [`QueueKind::Fifo`] reader walks every record in order. A
//! [`QueueKind::Lifo`] reader always takes the newest record (or window) and
//! counts the records it skipped as lost.
//!
//! No lock is taken on the data path. Acquire operations never sleep; an
//! unavailable slot is reported as [`QueueError::WouldBlock`].

mod error;
mod handles;

pub use error::{QueueError, QueueResult};
pub use handles::{QueueReader, QueueWriter, ReadBatch, ReadSlot, WriteBatch, WriteSlot};

use crate::schema::Message;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Default slot count of a sink queue.
pub const DEFAULT_QUEUE_LENGTH: usize = 10;

/// Default reader limit of a sink queue.
pub const DEFAULT_MAX_READERS: usize = 5;

/// Order in which readers see records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Every record, oldest first.
    #[default]
    Fifo,
    /// Newest record only; older unread records are skipped.
    Lifo,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueKind::Fifo => write!(f, "fifo"),
            QueueKind::Lifo => write!(f, "lifo"),
        }
    }
}

struct Slot {
    data: UnsafeCell<Box<[u8]>>,
    header: UnsafeCell<Box<[u8]>>,
}

impl Slot {
    fn new(data_len: usize, header_len: usize) -> Self {
        Self {
            data: UnsafeCell::new(vec![0u8; data_len].into_boxed_slice()),
            header: UnsafeCell::new(vec![0u8; header_len].into_boxed_slice()),
        }
    }
}

const READER_FREE: u8 = 0;
const READER_CLAIMED: u8 = 1;
const READER_ACTIVE: u8 = 2;

struct ReaderCursor {
    state: AtomicU8,
    cursor: AtomicU64,
    floor: AtomicU64,
    reads: AtomicU64,
    lost: AtomicU64,
}

impl ReaderCursor {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(READER_FREE),
            cursor: AtomicU64::new(0),
            floor: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        }
    }

    fn place(&self, seq: u64) {
        self.cursor.store(seq, Ordering::SeqCst);
        self.floor.store(seq, Ordering::SeqCst);
    }
}

/// Fixed-capacity record queue instantiated from a [`Message`] schema.
pub struct Queue {
    name: String,
    capacity: usize,
    kind: QueueKind,
    schema: Message,
    slots: Box<[Slot]>,
    write_seq: AtomicU64,
    aborted: AtomicU64,
    writer_attached: AtomicBool,
    readers: Box<[ReaderCursor]>,
}

// Slot contents are only touched through WriteSlot/ReadSlot, whose
// reservation protocol guarantees the writer and readers never alias a slot.
unsafe impl Sync for Queue {}
unsafe impl Send for Queue {}

impl Queue {
    /// Create a queue of `capacity` slots sized from `schema` (and its header).
    ///
    /// The schema is bound here: every queued leaf gets its slot region.
    pub fn new(
        name: impl Into<String>,
        schema: Message,
        capacity: usize,
        max_readers: usize,
    ) -> QueueResult<Arc<Self>> {
        Self::with_kind(name, schema, capacity, max_readers, QueueKind::Fifo)
    }

    pub fn with_kind(
        name: impl Into<String>,
        mut schema: Message,
        capacity: usize,
        max_readers: usize,
        kind: QueueKind,
    ) -> QueueResult<Arc<Self>> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        schema.bind_layout();
        let data_len = schema.size();
        let header_len = schema.header().map_or(0, Message::size);
        let name = name.into();

        tracing::debug!(
            "Created {} queue '{}': {} slots x {} bytes (+{} header), {} readers max",
            kind,
            name,
            capacity,
            data_len,
            header_len,
            max_readers
        );

        Ok(Arc::new(Self {
            name,
            capacity,
            kind,
            schema,
            slots: (0..capacity)
                .map(|_| Slot::new(data_len, header_len))
                .collect(),
            write_seq: AtomicU64::new(0),
            aborted: AtomicU64::new(0),
            writer_attached: AtomicBool::new(false),
            readers: (0..max_readers).map(|_| ReaderCursor::new()).collect(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_readers(&self) -> usize {
        self.readers.len()
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// The bound record schema.
    pub fn schema(&self) -> &Message {
        &self.schema
    }

    pub fn header_schema(&self) -> Option<&Message> {
        self.schema.header()
    }

    /// Number of records published so far.
    pub fn written(&self) -> u64 {
        self.write_seq.load(Ordering::Acquire)
    }

    pub fn active_readers(&self) -> usize {
        self.readers
            .iter()
            .filter(|r| r.state.load(Ordering::Acquire) == READER_ACTIVE)
            .count()
    }

    /// Take the single writer role.
    pub fn attach_writer(self: &Arc<Self>) -> QueueResult<QueueWriter> {
        if self
            .writer_attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(QueueError::WriterAttached);
        }
        Ok(QueueWriter::new(Arc::clone(self)))
    }

    /// Attach a reader. Its cursor starts at the current tail: records
    /// published before this call are never observed.
    pub fn attach_reader(self: &Arc<Self>) -> QueueResult<QueueReader> {
        let index = self
            .readers
            .iter()
            .position(|r| {
                r.state
                    .compare_exchange(
                        READER_FREE,
                        READER_CLAIMED,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            })
            .ok_or(QueueError::TooManyReaders {
                max: self.readers.len(),
            })?;

        let reader = &self.readers[index];
        reader.reads.store(0, Ordering::Relaxed);
        reader.lost.store(0, Ordering::Relaxed);
        // Publish a conservative position first, then go active, then move to
        // the tail observed after activation. The writer either sees this
        // reader active or we see its latest commit.
        reader.place(self.write_seq.load(Ordering::SeqCst));
        reader.state.store(READER_ACTIVE, Ordering::SeqCst);
        let origin = self.write_seq.load(Ordering::SeqCst);
        reader.place(origin);

        tracing::debug!("Queue '{}': reader {} attached", self.name, index);
        Ok(QueueReader::new(Arc::clone(self), index, origin))
    }

    pub fn stats(&self) -> QueueStats {
        let written = self.written();
        QueueStats {
            name: self.name.clone(),
            capacity: self.capacity,
            written,
            aborted_writes: self.aborted.load(Ordering::Relaxed),
            readers: self
                .readers
                .iter()
                .enumerate()
                .filter(|(_, r)| r.state.load(Ordering::Acquire) == READER_ACTIVE)
                .map(|(id, r)| {
                    let cursor = r.cursor.load(Ordering::Acquire);
                    ReaderStats {
                        id,
                        reads: r.reads.load(Ordering::Relaxed),
                        lost: r.lost.load(Ordering::Relaxed),
                        pending: written.saturating_sub(cursor),
                    }
                })
                .collect(),
        }
    }

    // ── Writer protocol ──

    /// Whether sequence `seq` may be reserved without clobbering data some
    /// reader still needs.
    fn slot_free_for(&self, seq: u64) -> bool {
        let capacity = self.capacity as u64;
        self.readers.iter().all(|r| {
            r.state.load(Ordering::SeqCst) != READER_ACTIVE
                || seq.saturating_sub(r.floor.load(Ordering::SeqCst)) < capacity
        })
    }

    fn next_write_seq(&self) -> u64 {
        // Only the writer advances write_seq.
        self.write_seq.load(Ordering::Relaxed)
    }

    /// Publish every reserved record up to and including `last`.
    fn publish(&self, last: u64) {
        self.write_seq.store(last + 1, Ordering::SeqCst);
    }

    fn record_abort(&self, records: u64) {
        self.aborted.fetch_add(records, Ordering::Relaxed);
    }

    fn release_writer(&self) {
        self.writer_attached.store(false, Ordering::Release);
    }

    // ── Reader protocol ──

    fn reader_cursor(&self, index: usize) -> u64 {
        self.readers[index].cursor.load(Ordering::Relaxed)
    }

    /// Move reader `index` past everything below `cursor`, keeping `floor`
    /// and above protected from the writer.
    fn advance_reader(&self, index: usize, cursor: u64, floor: u64, consumed: u64, lost: u64) {
        let reader = &self.readers[index];
        reader.reads.fetch_add(consumed, Ordering::Relaxed);
        if lost > 0 {
            reader.lost.fetch_add(lost, Ordering::Relaxed);
        }
        reader.floor.store(floor, Ordering::SeqCst);
        reader.cursor.store(cursor, Ordering::Release);
    }

    fn detach_reader(&self, index: usize) {
        self.readers[index]
            .state
            .store(READER_FREE, Ordering::Release);
        tracing::debug!("Queue '{}': reader {} detached", self.name, index);
    }

    // ── Slot access ──

    #[inline]
    fn slot(&self, seq: u64) -> &Slot {
        &self.slots[(seq % self.capacity as u64) as usize]
    }

    /// # Safety
    /// Caller must hold the write reservation for `seq`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_data_mut(&self, seq: u64) -> &mut [u8] {
        &mut *self.slot(seq).data.get()
    }

    /// # Safety
    /// Caller must hold the write reservation for `seq`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_header_mut(&self, seq: u64) -> &mut [u8] {
        &mut *self.slot(seq).header.get()
    }

    /// # Safety
    /// Caller must hold a read acquisition of `seq`.
    unsafe fn slot_data(&self, seq: u64) -> &[u8] {
        &*self.slot(seq).data.get()
    }

    /// # Safety
    /// Caller must hold a read acquisition of `seq`.
    unsafe fn slot_header(&self, seq: u64) -> &[u8] {
        &*self.slot(seq).header.get()
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("record_size", &self.schema.size())
            .field("written", &self.written())
            .field("active_readers", &self.active_readers())
            .finish()
    }
}

/// Point-in-time counters of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub name: String,
    pub capacity: usize,
    pub written: u64,
    pub aborted_writes: u64,
    pub readers: Vec<ReaderStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReaderStats {
    pub id: usize,
    pub reads: u64,
    /// Records a LIFO reader skipped.
    pub lost: u64,
    /// Published records this reader has not consumed yet.
    pub pending: u64,
}
