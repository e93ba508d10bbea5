use super::error::BufferError;
use super::memory::MemoryManager;
use super::snapshot::{BufferSnapshot, BufferState};
use bytes::Bytes;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

pub type BufferId = u64;

/// Size of the big-endian length prefix in front of every record.
pub const RECORD_PREFIX_SIZE: usize = std::mem::size_of::<i32>();

/// Growable append log of length-prefixed records.
///
/// A writer leases the buffer through [`try_lock`](Self::try_lock) before
/// appending; the sender reads committed bytes through snapshots and reports
/// what it has dealt with through
/// [`request_garbage_collection`](Self::request_garbage_collection).
pub struct Buffer {
    id: BufferId,
    max_size: usize,
    max_record_size: usize,
    memory: Arc<MemoryManager>,
    locked: AtomicBool,
    overflowed: AtomicBool,
    // set while a RecordWriter is open; compaction leaves the buffer alone
    writing: AtomicBool,
    inner: Mutex<BufferInner>,
}

struct BufferInner {
    // len() is the capacity; bytes past `committed.length` are scratch space
    data: Vec<u8>,
    committed: BufferState,
    garbage: BufferState,
    // absolute position of data[0]
    base: BufferState,
}

impl Buffer {
    /// The caller must already have reserved `initial_size` bytes from `memory`.
    pub fn new(
        id: BufferId,
        initial_size: usize,
        max_size: usize,
        max_record_size: usize,
        memory: Arc<MemoryManager>,
    ) -> Self {
        Self {
            id,
            max_size,
            max_record_size,
            memory,
            locked: AtomicBool::new(false),
            overflowed: AtomicBool::new(false),
            writing: AtomicBool::new(false),
            inner: Mutex::new(BufferInner {
                data: vec![0; initial_size],
                committed: BufferState::EMPTY,
                garbage: BufferState::EMPTY,
                base: BufferState::EMPTY,
            }),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().data.len()
    }

    /// Bytes currently reserved from the memory manager for this buffer.
    pub fn reserved_size(&self) -> usize {
        self.capacity()
    }

    pub fn committed_state(&self) -> BufferState {
        self.inner.lock().committed
    }

    pub fn garbage_state(&self) -> BufferState {
        self.inner.lock().garbage
    }

    /// Committed bytes that were not yet acknowledged by the sender.
    pub fn useful_length(&self) -> usize {
        let inner = self.inner.lock();
        inner.committed.length - inner.garbage.length
    }

    /// Starts a new record at the commit point. The record only becomes
    /// visible once [`RecordWriter::commit`] succeeds; dropping the writer
    /// abandons it.
    ///
    /// The data lock is only taken for each individual write, so snapshots
    /// proceed while a record is being encoded.
    pub fn begin_record(&self) -> Result<RecordWriter<'_>, BufferError> {
        if self.is_overflowed() {
            return Err(BufferError::Overflowed);
        }
        if self.writing.swap(true, Ordering::AcqRel) {
            return Err(BufferError::WriterActive);
        }

        let start = {
            let mut inner = self.inner.lock();
            let start = inner.committed.length;
            if let Err(e) = self.ensure_capacity(&mut inner, start + RECORD_PREFIX_SIZE) {
                drop(inner);
                self.writing.store(false, Ordering::Release);
                return Err(e);
            }
            start
        };

        Ok(RecordWriter {
            buffer: self,
            start,
            position: start + RECORD_PREFIX_SIZE,
            failure: None,
        })
    }

    /// Copies the committed range that has not been acknowledged yet.
    pub fn try_make_snapshot(self: &Arc<Self>) -> Option<BufferSnapshot> {
        let inner = self.inner.lock();
        let pending = inner.committed - inner.garbage;
        if pending.records_count == 0 {
            return None;
        }

        let data = Bytes::copy_from_slice(&inner.data[inner.garbage.length..inner.committed.length]);
        let start = inner.base + inner.garbage;

        Some(BufferSnapshot::new(
            Arc::clone(self),
            data,
            pending.records_count,
            start,
        ))
    }

    /// Marks everything up to the absolute position `upto` as reclaimable.
    pub fn request_garbage_collection(&self, upto: BufferState) {
        let mut inner = self.inner.lock();
        if upto.length <= inner.base.length {
            return;
        }

        let relative = upto - inner.base;
        let relative = BufferState::new(
            relative.length.min(inner.committed.length),
            relative.records_count.min(inner.committed.records_count),
        );

        if relative.length > inner.garbage.length {
            inner.garbage = relative;
        }
    }

    /// Shifts the live bytes down over the acknowledged prefix. Does nothing
    /// while a record is open.
    pub fn collect_garbage(&self) {
        let mut inner = self.inner.lock();
        if self.writing.load(Ordering::Acquire) {
            return;
        }
        let garbage = inner.garbage;

        if garbage.length > 0 {
            let committed = inner.committed.length;
            inner.data.copy_within(garbage.length..committed, 0);
            inner.committed = inner.committed - garbage;
            inner.base = inner.base + garbage;
            inner.garbage = BufferState::EMPTY;
        }

        if garbage.length > 0 || inner.committed.length == 0 {
            self.overflowed.store(false, Ordering::Release);
        }
    }

    fn ensure_capacity(&self, inner: &mut BufferInner, needed: usize) -> Result<(), BufferError> {
        let capacity = inner.data.len();
        if needed <= capacity {
            return Ok(());
        }

        if needed > self.max_size {
            return Err(self.overflow(needed));
        }

        let mut new_capacity = capacity.max(1);
        while new_capacity < needed {
            new_capacity = new_capacity.saturating_mul(2);
        }
        let new_capacity = new_capacity.min(self.max_size);

        if !self.memory.try_reserve(new_capacity - capacity) {
            return Err(self.overflow(needed));
        }

        debug!(
            buffer = self.id,
            from = capacity,
            to = new_capacity,
            "Growing buffer"
        );
        inner.data.resize(new_capacity, 0);
        Ok(())
    }

    fn overflow(&self, requested: usize) -> BufferError {
        self.overflowed.store(true, Ordering::Release);
        debug!(buffer = self.id, requested, max_size = self.max_size, "Buffer overflowed");
        BufferError::Overflow {
            requested,
            max_size: self.max_size,
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("max_size", &self.max_size)
            .field("locked", &self.is_locked())
            .field("overflowed", &self.is_overflowed())
            .finish_non_exhaustive()
    }
}

/// In-progress record. Bytes past the commit point belong to the writer
/// until it is committed or dropped.
pub struct RecordWriter<'a> {
    buffer: &'a Buffer,
    start: usize,
    position: usize,
    failure: Option<BufferError>,
}

impl RecordWriter<'_> {
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let record_size = self.position + bytes.len() - self.start;
        if record_size > self.buffer.max_record_size {
            return Err(self.fail(BufferError::RecordTooLarge {
                size: record_size,
                max_size: self.buffer.max_record_size,
            }));
        }

        let end = self.position + bytes.len();
        let mut inner = self.buffer.inner.lock();
        if let Err(e) = self.buffer.ensure_capacity(&mut inner, end) {
            drop(inner);
            return Err(self.fail(e));
        }

        inner.data[self.position..end].copy_from_slice(bytes);
        drop(inner);
        self.position = end;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BufferError> {
        self.write_bytes(&[value])
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), BufferError> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), BufferError> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Framed size (prefix included) written so far.
    pub fn record_size(&self) -> usize {
        self.position - self.start
    }

    /// First buffer error hit while writing, if any.
    pub fn take_failure(&mut self) -> Option<BufferError> {
        self.failure.take()
    }

    /// Writes the length prefix and publishes the record. Returns its framed
    /// size.
    pub fn commit(self) -> usize {
        let payload = (self.position - self.start - RECORD_PREFIX_SIZE) as i32;
        let start = self.start;
        let size = self.record_size();

        let mut inner = self.buffer.inner.lock();
        inner.data[start..start + RECORD_PREFIX_SIZE].copy_from_slice(&payload.to_be_bytes());
        inner.committed = inner.committed + BufferState::new(size, 1);
        size
    }

    fn fail(&mut self, error: BufferError) -> BufferError {
        if self.failure.is_none() {
            self.failure = Some(error.clone());
        }
        error
    }
}

impl Drop for RecordWriter<'_> {
    fn drop(&mut self) {
        self.buffer.writing.store(false, Ordering::Release);
    }
}

impl io::Write for RecordWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf).map_err(io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(initial: usize, max: usize, max_record: usize, memory: usize) -> Arc<Buffer> {
        let memory = Arc::new(MemoryManager::new(memory));
        assert!(memory.try_reserve(initial));
        Arc::new(Buffer::new(1, initial, max, max_record, memory))
    }

    fn put(buffer: &Buffer, payload: &[u8]) -> Result<usize, BufferError> {
        let mut writer = buffer.begin_record()?;
        writer.write_bytes(payload)?;
        Ok(writer.commit())
    }

    #[test]
    fn test_commit_frames_record() {
        let buffer = buffer(64, 1024, 256, 4096);
        assert_eq!(put(&buffer, b"abc").unwrap(), 7);

        let snapshot = buffer.try_make_snapshot().unwrap();
        assert_eq!(snapshot.records_count(), 1);
        assert_eq!(&snapshot.data()[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_empty_buffer_has_no_snapshot() {
        let buffer = buffer(64, 1024, 256, 4096);
        assert!(buffer.try_make_snapshot().is_none());
    }

    #[test]
    fn test_abandoned_record_is_rolled_back() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"first").unwrap();

        {
            let mut writer = buffer.begin_record().unwrap();
            writer.write_bytes(b"half-written").unwrap();
        }

        put(&buffer, b"second").unwrap();

        let snapshot = buffer.try_make_snapshot().unwrap();
        assert_eq!(snapshot.records_count(), 2);
        assert_eq!(snapshot.len(), 9 + 10);
        assert_eq!(&snapshot.data()[9..], b"\0\0\0\x06second");
    }

    #[test]
    fn test_growth_doubles_and_reserves_memory() {
        let memory = Arc::new(MemoryManager::new(4096));
        assert!(memory.try_reserve(16));
        let buffer = Buffer::new(1, 16, 1024, 512, Arc::clone(&memory));

        let mut writer = buffer.begin_record().unwrap();
        writer.write_bytes(&[7; 40]).unwrap();
        writer.commit();

        assert_eq!(buffer.capacity(), 64);
        assert_eq!(memory.reserved_bytes(), 64);
    }

    #[test]
    fn test_growth_refused_marks_overflow_and_keeps_committed_data() {
        let memory = Arc::new(MemoryManager::new(32));
        assert!(memory.try_reserve(32));
        let buffer = Arc::new(Buffer::new(1, 32, 1024, 512, Arc::clone(&memory)));

        put(&buffer, b"0123456789").unwrap();
        let error = put(&buffer, &[1; 40]).unwrap_err();

        assert!(matches!(error, BufferError::Overflow { .. }));
        assert!(buffer.is_overflowed());
        assert_eq!(buffer.begin_record().err(), Some(BufferError::Overflowed));

        let snapshot = buffer.try_make_snapshot().unwrap();
        assert_eq!(snapshot.records_count(), 1);
        assert_eq!(&snapshot.data()[4..], b"0123456789");
        assert_eq!(memory.reserved_bytes(), 32);
    }

    #[test]
    fn test_max_size_is_hard_limit() {
        let buffer = buffer(16, 32, 64, 4096);
        let error = put(&buffer, &[0; 40]).unwrap_err();
        assert_eq!(
            error,
            BufferError::Overflow {
                requested: 44,
                max_size: 32
            }
        );
    }

    #[test]
    fn test_too_large_record_rejected_before_growth() {
        let memory = Arc::new(MemoryManager::new(4096));
        assert!(memory.try_reserve(16));
        let buffer = Buffer::new(1, 16, 1024, 20, Arc::clone(&memory));

        let mut writer = buffer.begin_record().unwrap();
        let error = writer.write_bytes(&[0; 17]).unwrap_err();
        assert_eq!(
            error,
            BufferError::RecordTooLarge {
                size: 21,
                max_size: 20
            }
        );
        assert_eq!(writer.take_failure(), Some(error));
        drop(writer);

        assert_eq!(buffer.capacity(), 16);
        assert!(!buffer.is_overflowed());
    }

    #[test]
    fn test_garbage_collection_compacts_acknowledged_prefix() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"aa").unwrap();
        put(&buffer, b"bbb").unwrap();

        let snapshot = buffer.try_make_snapshot().unwrap();
        put(&buffer, b"cccc").unwrap();

        buffer.request_garbage_collection(snapshot.end());
        assert_eq!(buffer.useful_length(), 8);

        // The acknowledged prefix is excluded even before compaction.
        let pending = buffer.try_make_snapshot().unwrap();
        assert_eq!(pending.records_count(), 1);
        assert_eq!(&pending.data()[..], b"\0\0\0\x04cccc");

        buffer.collect_garbage();
        assert_eq!(buffer.committed_state(), BufferState::new(8, 1));
        assert_eq!(buffer.garbage_state(), BufferState::EMPTY);

        let compacted = buffer.try_make_snapshot().unwrap();
        assert_eq!(compacted.data(), pending.data());
        assert_eq!(compacted.start(), pending.start());
    }

    #[test]
    fn test_garbage_request_after_compaction_uses_absolute_positions() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"one").unwrap();
        let first = buffer.try_make_snapshot().unwrap();
        buffer.request_garbage_collection(first.end());

        put(&buffer, b"two").unwrap();
        let second = buffer.try_make_snapshot().unwrap();

        // Compaction lands between the snapshot and its acknowledgement.
        buffer.collect_garbage();
        buffer.request_garbage_collection(second.end());

        assert_eq!(buffer.useful_length(), 0);
        assert!(buffer.try_make_snapshot().is_none());
    }

    #[test]
    fn test_garbage_offset_is_monotonic() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"x").unwrap();
        let early = buffer.try_make_snapshot().unwrap();
        put(&buffer, b"y").unwrap();
        let late = buffer.try_make_snapshot().unwrap();

        buffer.request_garbage_collection(late.end());
        buffer.request_garbage_collection(early.end());

        assert_eq!(buffer.garbage_state(), BufferState::new(10, 2));
    }

    #[test]
    fn test_compaction_clears_overflow() {
        let memory = Arc::new(MemoryManager::new(16));
        assert!(memory.try_reserve(16));
        let buffer = Arc::new(Buffer::new(1, 16, 1024, 512, memory));

        put(&buffer, b"12345678").unwrap();
        assert!(put(&buffer, b"12345678").is_err());
        assert!(buffer.is_overflowed());

        let snapshot = buffer.try_make_snapshot().unwrap();
        buffer.request_garbage_collection(snapshot.end());
        buffer.collect_garbage();

        assert!(!buffer.is_overflowed());
        assert!(put(&buffer, b"12345678").is_ok());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let buffer = buffer(16, 32, 16, 64);
        assert!(buffer.try_lock());
        assert!(!buffer.try_lock());
        buffer.unlock();
        assert!(buffer.try_lock());
    }

    #[test]
    fn test_snapshot_sees_only_committed_bytes_of_open_record() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"done").unwrap();

        let mut writer = buffer.begin_record().unwrap();
        writer.write_bytes(b"pending").unwrap();

        let snapshot = buffer.try_make_snapshot().unwrap();
        assert_eq!(&snapshot.data()[..], b"\0\0\0\x04done");

        writer.commit();
        assert_eq!(buffer.try_make_snapshot().unwrap().records_count(), 2);
    }

    #[test]
    fn test_snapshot_does_not_wait_for_slow_encoder() {
        use std::sync::mpsc;
        use std::thread;
        use std::time::{Duration, Instant};

        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"ready").unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let writer_thread = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut writer = buffer.begin_record().unwrap();
                writer.write_bytes(b"slow").unwrap();
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(500));
                writer.commit();
            })
        };

        started_rx.recv().unwrap();
        let started = Instant::now();
        let snapshot = buffer.try_make_snapshot().unwrap();
        let waited = started.elapsed();

        assert_eq!(snapshot.records_count(), 1);
        assert!(waited < Duration::from_millis(250), "snapshot waited {waited:?}");

        writer_thread.join().unwrap();
        assert_eq!(buffer.committed_state().records_count, 2);
    }

    #[test]
    fn test_second_open_record_is_refused() {
        let buffer = buffer(64, 1024, 256, 4096);
        let writer = buffer.begin_record().unwrap();
        assert_eq!(buffer.begin_record().err(), Some(BufferError::WriterActive));

        drop(writer);
        assert!(buffer.begin_record().is_ok());
    }

    #[test]
    fn test_compaction_waits_for_open_record() {
        let buffer = buffer(64, 1024, 256, 4096);
        put(&buffer, b"acked").unwrap();
        let snapshot = buffer.try_make_snapshot().unwrap();
        buffer.request_garbage_collection(snapshot.end());

        let mut writer = buffer.begin_record().unwrap();
        writer.write_bytes(b"open").unwrap();
        buffer.collect_garbage();
        assert_eq!(buffer.garbage_state(), BufferState::new(9, 1));

        writer.commit();
        buffer.collect_garbage();
        let pending = buffer.try_make_snapshot().unwrap();
        assert_eq!(&pending.data()[..], b"\0\0\0\x04open");
    }

    #[test]
    fn test_io_write_reports_failure() {
        use std::io::Write;

        let buffer = buffer(16, 1024, 12, 4096);
        let mut writer = buffer.begin_record().unwrap();
        assert!(writer.write_all(b"12345678").is_ok());
        assert!(writer.write_all(b"9").is_err());
        assert!(matches!(
            writer.take_failure(),
            Some(BufferError::RecordTooLarge { .. })
        ));
    }
}
