use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BufferError {
    #[error("Buffer overflow: attempted to grow to {requested} bytes, max size {max_size}")]
    Overflow { requested: usize, max_size: usize },

    #[error("Record too large: {size} bytes exceeds max record size {max_size}")]
    RecordTooLarge { size: usize, max_size: usize },

    #[error("Buffer pool exhausted: could not reserve {requested} bytes")]
    PoolExhausted { requested: usize },

    #[error("Buffer is overflowed and does not accept records until compacted")]
    Overflowed,

    #[error("Another record is already being written into this buffer")]
    WriterActive,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SliceError {
    #[error(
        "Encountered a record with length {length} greater than maximum buffer slice size {max_slice_size}"
    )]
    RecordExceedsSlice { length: usize, max_slice_size: usize },

    #[error("Corrupted record framing at offset {offset}")]
    CorruptedFraming { offset: usize },
}

impl BufferError {
    /// Capacity problems are worth waking the sender for; a single oversized
    /// record is not.
    pub fn is_capacity_related(&self) -> bool {
        match self {
            BufferError::Overflow { .. }
            | BufferError::PoolExhausted { .. }
            | BufferError::Overflowed => true,
            BufferError::RecordTooLarge { .. } | BufferError::WriterActive => false,
        }
    }
}
