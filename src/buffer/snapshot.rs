use super::record_buffer::Buffer;
use bytes::Bytes;
use std::ops::{Add, Sub};
use std::sync::Arc;

/// A `(length, records)` position inside a buffer.
///
/// Positions handed out to the sender are absolute: they count every byte the
/// buffer ever committed, so a compaction running between a snapshot and its
/// acknowledgement cannot shift them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BufferState {
    pub length: usize,
    pub records_count: usize,
}

impl BufferState {
    pub const EMPTY: BufferState = BufferState {
        length: 0,
        records_count: 0,
    };

    pub fn new(length: usize, records_count: usize) -> Self {
        Self {
            length,
            records_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records_count == 0
    }
}

impl Add for BufferState {
    type Output = BufferState;

    fn add(self, rhs: BufferState) -> BufferState {
        BufferState {
            length: self.length + rhs.length,
            records_count: self.records_count + rhs.records_count,
        }
    }
}

impl Sub for BufferState {
    type Output = BufferState;

    fn sub(self, rhs: BufferState) -> BufferState {
        BufferState {
            length: self.length.saturating_sub(rhs.length),
            records_count: self.records_count.saturating_sub(rhs.records_count),
        }
    }
}

/// Immutable copy of the committed, not yet acknowledged bytes of one buffer.
#[derive(Clone)]
pub struct BufferSnapshot {
    source: Arc<Buffer>,
    data: Bytes,
    records_count: usize,
    start: BufferState,
}

impl BufferSnapshot {
    pub(crate) fn new(
        source: Arc<Buffer>,
        data: Bytes,
        records_count: usize,
        start: BufferState,
    ) -> Self {
        Self {
            source,
            data,
            records_count,
            start,
        }
    }

    pub fn source(&self) -> &Arc<Buffer> {
        &self.source
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records_count == 0
    }

    pub fn records_count(&self) -> usize {
        self.records_count
    }

    pub fn state(&self) -> BufferState {
        BufferState::new(self.data.len(), self.records_count)
    }

    /// Absolute position of the first byte in this snapshot.
    pub fn start(&self) -> BufferState {
        self.start
    }

    /// Absolute position right after the last record in this snapshot.
    pub fn end(&self) -> BufferState {
        self.start + self.state()
    }
}

impl std::fmt::Debug for BufferSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSnapshot")
            .field("buffer", &self.source.id())
            .field("length", &self.data.len())
            .field("records_count", &self.records_count)
            .field("start", &self.start)
            .finish()
    }
}
