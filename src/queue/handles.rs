//! Writer and reader roles of a [`Queue`] and their slot guards.
//!
//! A reservation is a guard borrowing its handle mutably, so a handle holds
//! at most one outstanding slot or batch. Dropping a guard without finishing
//! it is the same as aborting it.

use super::{Queue, QueueError, QueueKind, QueueResult};
use crate::schema::{DataNode, Message};
use std::ops::Range;
use std::sync::Arc;

/// The single writer role of a queue.
pub struct QueueWriter {
    queue: Arc<Queue>,
}

impl QueueWriter {
    pub(super) fn new(queue: Arc<Queue>) -> Self {
        Self { queue }
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn schema(&self) -> &Message {
        self.queue.schema()
    }

    /// Reserve the next slot, or `WouldBlock` if every slot still holds a
    /// record some reader has not released.
    pub fn start_write(&mut self) -> QueueResult<WriteSlot<'_>> {
        let seq = self.queue.next_write_seq();
        if !self.queue.slot_free_for(seq) {
            tracing::trace!("Queue '{}' full at seq {}", self.queue.name(), seq);
            return Err(QueueError::WouldBlock);
        }
        Ok(WriteSlot {
            writer: self,
            seq,
            done: false,
        })
    }

    /// Reserve `count` consecutive slots, all or nothing.
    pub fn start_write_batch(&mut self, count: usize) -> QueueResult<WriteBatch<'_>> {
        let capacity = self.queue.capacity();
        if count == 0 || count > capacity {
            return Err(QueueError::InvalidBatch {
                count,
                new: count,
                capacity,
            });
        }
        let first = self.queue.next_write_seq();
        if !self.queue.slot_free_for(first + count as u64 - 1) {
            tracing::trace!(
                "Queue '{}' has no room for {} records at seq {}",
                self.queue.name(),
                count,
                first
            );
            return Err(QueueError::WouldBlock);
        }
        Ok(WriteBatch {
            writer: self,
            first,
            len: count,
            done: false,
        })
    }

    /// Copy one whole record (data bytes only) into the queue.
    pub fn try_push(&mut self, record: &[u8]) -> QueueResult<u64> {
        let expected = self.queue.schema().size();
        if record.len() != expected {
            return Err(QueueError::SizeMismatch {
                expected,
                got: record.len(),
            });
        }
        let mut slot = self.start_write()?;
        slot.data_mut().copy_from_slice(record);
        Ok(slot.end_write())
    }
}

impl Drop for QueueWriter {
    fn drop(&mut self) {
        self.queue.release_writer();
    }
}

impl std::fmt::Debug for QueueWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueWriter")
            .field("queue", &self.queue.name())
            .field("next_seq", &self.queue.next_write_seq())
            .finish()
    }
}

/// A reserved, unpublished slot.
pub struct WriteSlot<'a> {
    writer: &'a mut QueueWriter,
    seq: u64,
    done: bool,
}

impl<'a> WriteSlot<'a> {
    /// Sequence number this slot will be published under.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: this guard holds the reservation for `seq`.
        unsafe { self.writer.queue.slot_data_mut(self.seq) }
    }

    pub fn header_mut(&mut self) -> &mut [u8] {
        // SAFETY: this guard holds the reservation for `seq`.
        unsafe { self.writer.queue.slot_header_mut(self.seq) }
    }

    /// Copy `src` into `node`'s region of this slot.
    pub fn write(&mut self, node: &DataNode, src: &[u8]) {
        node.write(self.data_mut(), src);
    }

    /// Publish the record to every attached reader.
    pub fn end_write(mut self) -> u64 {
        self.done = true;
        self.writer.queue.publish(self.seq);
        self.seq
    }

    /// Release the reservation without publishing.
    pub fn end_write_abort(mut self) {
        self.done = true;
        self.writer.queue.record_abort(1);
    }
}

impl std::fmt::Debug for WriteSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSlot").field("seq", &self.seq).finish()
    }
}

impl Drop for WriteSlot<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.writer.queue.record_abort(1);
        }
    }
}

/// Consecutive reserved slots, published together.
pub struct WriteBatch<'a> {
    writer: &'a mut QueueWriter,
    first: u64,
    len: usize,
    done: bool,
}

impl<'a> WriteBatch<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sequence numbers the records will be published under.
    pub fn seqs(&self) -> Range<u64> {
        self.first..self.first + self.len as u64
    }

    fn seq_of(&self, index: usize) -> u64 {
        assert!(
            index < self.len,
            "batch index {} out of range for {} records",
            index,
            self.len
        );
        self.first + index as u64
    }

    pub fn data_mut(&mut self, index: usize) -> &mut [u8] {
        let seq = self.seq_of(index);
        // SAFETY: this guard holds the reservation for every seq in the batch.
        unsafe { self.writer.queue.slot_data_mut(seq) }
    }

    pub fn header_mut(&mut self, index: usize) -> &mut [u8] {
        let seq = self.seq_of(index);
        // SAFETY: as for `data_mut`.
        unsafe { self.writer.queue.slot_header_mut(seq) }
    }

    /// Publish every record of the batch.
    pub fn end_write(self) -> Range<u64> {
        let len = self.len;
        self.end_write_first(len)
    }

    /// Publish only the first `count` records and release the rest.
    pub fn end_write_first(mut self, count: usize) -> Range<u64> {
        let count = count.min(self.len);
        self.done = true;
        if count > 0 {
            self.writer.queue.publish(self.first + count as u64 - 1);
        }
        if count < self.len {
            self.writer.queue.record_abort((self.len - count) as u64);
        }
        self.first..self.first + count as u64
    }

    pub fn end_write_abort(mut self) {
        self.done = true;
        self.writer.queue.record_abort(self.len as u64);
    }
}

impl std::fmt::Debug for WriteBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("seqs", &self.seqs())
            .finish()
    }
}

impl Drop for WriteBatch<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.writer.queue.record_abort(self.len as u64);
        }
    }
}

/// One independently-advancing reader of a queue.
///
/// Besides single records a reader can take sliding windows: `batch`
/// records of which `new_per_batch` were not part of the previous window.
/// The `batch - new_per_batch` older records stay protected from the writer
/// between windows.
pub struct QueueReader {
    queue: Arc<Queue>,
    index: usize,
    /// Tail at attach time; nothing older is ever returned.
    origin: u64,
    batch: usize,
    new_per_batch: usize,
}

impl QueueReader {
    pub(super) fn new(queue: Arc<Queue>, index: usize, origin: u64) -> Self {
        Self {
            queue,
            index,
            origin,
            batch: 1,
            new_per_batch: 1,
        }
    }

    /// Reader slot index inside the queue.
    pub fn id(&self) -> usize {
        self.index
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn schema(&self) -> &Message {
        self.queue.schema()
    }

    /// Published records not yet consumed by this reader.
    pub fn pending(&self) -> u64 {
        self.queue
            .written()
            .saturating_sub(self.queue.reader_cursor(self.index))
    }

    pub fn batch_size(&self) -> usize {
        self.batch
    }

    pub fn new_per_batch(&self) -> usize {
        self.new_per_batch
    }

    /// Shape the windows returned by [`start_read_batch`](Self::start_read_batch).
    ///
    /// Requires `1 <= new_per_batch <= batch <= capacity`. The next window
    /// only contains records published from now on.
    pub fn set_batch(&mut self, batch: usize, new_per_batch: usize) -> QueueResult<()> {
        let capacity = self.queue.capacity();
        if new_per_batch == 0 || new_per_batch > batch || batch > capacity {
            return Err(QueueError::InvalidBatch {
                count: batch,
                new: new_per_batch,
                capacity,
            });
        }
        self.batch = batch;
        self.new_per_batch = new_per_batch;
        self.origin = self.queue.reader_cursor(self.index);
        Ok(())
    }

    /// Acquire the next record: the oldest unseen one, or the newest one on
    /// a LIFO queue. `WouldBlock` if there is none.
    pub fn start_read(&mut self) -> QueueResult<ReadSlot<'_>> {
        let cursor = self.queue.reader_cursor(self.index);
        let written = self.queue.written();
        if cursor >= written {
            return Err(QueueError::WouldBlock);
        }
        let seq = match self.queue.kind() {
            QueueKind::Fifo => cursor,
            QueueKind::Lifo => written - 1,
        };
        Ok(ReadSlot {
            skipped: seq - cursor,
            reader: self,
            seq,
        })
    }

    /// Acquire the next window of `batch_size()` records, or `WouldBlock`
    /// until `new_per_batch()` unseen records (and a full first window) exist.
    pub fn start_read_batch(&mut self) -> QueueResult<ReadBatch<'_>> {
        let cursor = self.queue.reader_cursor(self.index);
        let written = self.queue.written();
        let count = self.batch as u64;
        let ready_at = (cursor + self.new_per_batch as u64).max(self.origin + count);
        if written < ready_at {
            return Err(QueueError::WouldBlock);
        }
        let end = match self.queue.kind() {
            QueueKind::Fifo => ready_at,
            QueueKind::Lifo => written,
        };
        let start = end - count;
        Ok(ReadBatch {
            start,
            end,
            skipped: start.saturating_sub(cursor),
            cursor,
            reader: self,
        })
    }

    /// Copy the next record (data bytes only) into `out`.
    pub fn try_pop_into(&mut self, out: &mut Vec<u8>) -> QueueResult<u64> {
        let slot = self.start_read()?;
        out.clear();
        out.extend_from_slice(slot.data());
        Ok(slot.end_read())
    }

    fn finish(&mut self, cursor: u64, consumed: u64, skipped: u64) {
        let retain = (self.batch - self.new_per_batch) as u64;
        let floor = cursor.saturating_sub(retain).max(self.origin);
        self.queue
            .advance_reader(self.index, cursor, floor, consumed, skipped);
    }
}

impl Drop for QueueReader {
    fn drop(&mut self) {
        self.queue.detach_reader(self.index);
    }
}

impl std::fmt::Debug for QueueReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReader")
            .field("queue", &self.queue.name())
            .field("id", &self.index)
            .field("batch", &(self.batch, self.new_per_batch))
            .field("pending", &self.pending())
            .finish()
    }
}

/// An acquired record, readable until released.
pub struct ReadSlot<'a> {
    reader: &'a mut QueueReader,
    seq: u64,
    skipped: u64,
}

impl<'a> ReadSlot<'a> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Unseen records passed over to reach this one (LIFO only).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: the writer cannot reuse this slot until our floor passes `seq`.
        unsafe { self.reader.queue.slot_data(self.seq) }
    }

    pub fn header(&self) -> &[u8] {
        // SAFETY: as for `data`.
        unsafe { self.reader.queue.slot_header(self.seq) }
    }

    /// Copy `node`'s region of this record into `dst`.
    pub fn read(&self, node: &DataNode, dst: &mut [u8]) {
        node.read(self.data(), dst);
    }

    /// Mark the record seen and advance this reader.
    pub fn end_read(self) -> u64 {
        self.reader.finish(self.seq + 1, 1, self.skipped);
        self.seq
    }

    /// Release without advancing; the same record is returned next time.
    /// Dropping the slot has the same effect.
    pub fn end_read_abort(self) {}
}

impl std::fmt::Debug for ReadSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSlot")
            .field("reader", &self.reader.index)
            .field("seq", &self.seq)
            .finish()
    }
}

/// An acquired window of consecutive records.
pub struct ReadBatch<'a> {
    reader: &'a mut QueueReader,
    start: u64,
    end: u64,
    /// Reader cursor when the window was taken.
    cursor: u64,
    skipped: u64,
}

impl<'a> ReadBatch<'a> {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn seqs(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Indices of the records this reader had not seen before the window.
    pub fn fresh(&self) -> Range<usize> {
        let seen = self.cursor.max(self.start) - self.start;
        seen as usize..self.len()
    }

    /// Unseen records passed over to reach this window (LIFO only).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn seq_of(&self, index: usize) -> u64 {
        assert!(
            index < self.len(),
            "batch index {} out of range for {} records",
            index,
            self.len()
        );
        self.start + index as u64
    }

    pub fn data(&self, index: usize) -> &[u8] {
        let seq = self.seq_of(index);
        // SAFETY: every seq of the window is at or above our floor.
        unsafe { self.reader.queue.slot_data(seq) }
    }

    pub fn header(&self, index: usize) -> &[u8] {
        let seq = self.seq_of(index);
        // SAFETY: as for `data`.
        unsafe { self.reader.queue.slot_header(seq) }
    }

    /// Data bytes of every record, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.len()).map(move |i| self.data(i))
    }

    /// Advance past the window; its older part stays retained for the next one.
    pub fn end_read(self) -> Range<u64> {
        let fresh = self.fresh().len() as u64;
        self.reader.finish(self.end, fresh, self.skipped);
        self.start..self.end
    }

    /// Release without advancing.
    pub fn end_read_abort(self) {}
}

impl std::fmt::Debug for ReadBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBatch")
            .field("reader", &self.reader.index)
            .field("seqs", &self.seqs())
            .finish()
    }
}
