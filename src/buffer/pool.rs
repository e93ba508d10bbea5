use super::error::BufferError;
use super::memory::MemoryManager;
use super::record_buffer::{Buffer, BufferId};
use super::snapshot::BufferSnapshot;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Dequeue attempts made before giving up on reuse and creating a buffer.
const MAX_DEQUEUE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub initial_buffer_size: usize,
    pub max_buffer_size: usize,
    pub max_record_size: usize,
}

impl PoolLimits {
    /// A buffer holding more useful bytes than this cannot be guaranteed to
    /// fit one more maximal record.
    pub fn almost_full_watermark(&self) -> usize {
        self.max_buffer_size.saturating_sub(self.max_record_size)
    }
}

/// Per-destination set of buffers.
///
/// Every buffer lives in the `buffers` arena for its whole life. Unlocked
/// buffers are additionally queued in `available`, oldest first.
pub struct BufferPool {
    memory: Arc<MemoryManager>,
    limits: PoolLimits,
    next_id: AtomicU64,
    buffers: DashMap<BufferId, Arc<Buffer>>,
    available: Mutex<VecDeque<Arc<Buffer>>>,
}

impl BufferPool {
    pub fn new(memory: Arc<MemoryManager>, limits: PoolLimits) -> Self {
        Self {
            memory,
            limits,
            next_id: AtomicU64::new(1),
            buffers: DashMap::new(),
            available: Mutex::new(VecDeque::new()),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    /// Leases a buffer for writing. Never blocks: either an idle buffer with
    /// room for a maximal record is reused, or a new one is created if the
    /// memory budget allows it.
    pub fn try_acquire(&self) -> Result<BufferLease<'_>, BufferError> {
        for _ in 0..MAX_DEQUEUE_ATTEMPTS {
            let Some(buffer) = self.available.lock().pop_front() else {
                break;
            };

            if self.is_almost_full(&buffer) || !buffer.try_lock() {
                self.requeue(buffer);
                continue;
            }

            buffer.collect_garbage();
            if buffer.is_overflowed() {
                buffer.unlock();
                self.requeue(buffer);
                continue;
            }

            return Ok(BufferLease { pool: self, buffer });
        }

        self.create()
    }

    /// Returns a leased buffer to the back of the available queue.
    pub fn release(&self, lease: BufferLease<'_>) {
        drop(lease);
    }

    /// Removes an idle buffer from the pool for good and gives its capacity
    /// back to the memory manager. Returns `false` when the buffer is unknown
    /// or currently leased.
    pub fn free(&self, id: BufferId) -> bool {
        let Some(buffer) = self.buffers.get(&id).map(|entry| Arc::clone(entry.value())) else {
            return false;
        };

        // Freed buffers stay locked so a stale queue entry can never be leased.
        if !buffer.try_lock() {
            return false;
        }

        self.buffers.remove(&id);
        self.available.lock().retain(|queued| queued.id() != id);
        self.memory.release(buffer.reserved_size());

        debug!(buffer = id, size = buffer.reserved_size(), "Freed buffer");
        true
    }

    /// Frees every idle buffer. Returns how many were freed.
    pub fn free_all(&self) -> usize {
        self.buffers()
            .iter()
            .filter(|buffer| self.free(buffer.id()))
            .count()
    }

    /// Weakly consistent view of every member, leased or not, in creation
    /// order.
    pub fn buffers(&self) -> Vec<Arc<Buffer>> {
        let mut buffers: Vec<_> = self
            .buffers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        buffers.sort_by_key(|buffer| buffer.id());
        buffers
    }

    pub fn make_snapshots(&self) -> Vec<BufferSnapshot> {
        self.buffers()
            .iter()
            .filter_map(Buffer::try_make_snapshot)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Sum of the capacities of all member buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.buffers
            .iter()
            .map(|entry| entry.value().reserved_size())
            .sum()
    }

    pub fn is_almost_full(&self, buffer: &Buffer) -> bool {
        buffer.useful_length() > self.limits.almost_full_watermark()
    }

    fn create(&self) -> Result<BufferLease<'_>, BufferError> {
        let size = self.limits.initial_buffer_size;
        if !self.memory.try_reserve(size) {
            return Err(BufferError::PoolExhausted { requested: size });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer = Arc::new(Buffer::new(
            id,
            size,
            self.limits.max_buffer_size,
            self.limits.max_record_size,
            Arc::clone(&self.memory),
        ));
        // Not yet visible to anyone else, so this cannot fail.
        buffer.try_lock();
        self.buffers.insert(id, Arc::clone(&buffer));

        debug!(buffer = id, size, "Created buffer");
        Ok(BufferLease { pool: self, buffer })
    }

    fn requeue(&self, buffer: Arc<Buffer>) {
        if self.buffers.contains_key(&buffer.id()) {
            self.available.lock().push_back(buffer);
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("limits", &self.limits)
            .field("buffers", &self.buffers.len())
            .field("available", &self.available.lock().len())
            .finish()
    }
}

/// Exclusive write access to one pooled buffer. Dropping the lease unlocks
/// the buffer and queues it for reuse.
pub struct BufferLease<'a> {
    pool: &'a BufferPool,
    buffer: Arc<Buffer>,
}

impl BufferLease<'_> {
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }
}

impl Deref for BufferLease<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.buffer
    }
}

impl Drop for BufferLease<'_> {
    fn drop(&mut self) {
        self.buffer.unlock();
        self.pool.requeue(Arc::clone(&self.buffer));
    }
}
