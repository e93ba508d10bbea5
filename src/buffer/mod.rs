pub mod batch;
pub mod error;
pub mod memory;
pub mod pool;
pub mod record_buffer;
pub mod slice;
pub mod snapshot;

pub use batch::{Batches, BufferSnapshotBatcher, SliceBatch};
pub use error::{BufferError, SliceError};
pub use memory::MemoryManager;
pub use pool::{BufferLease, BufferPool, PoolLimits};
pub use record_buffer::{Buffer, BufferId, RECORD_PREFIX_SIZE, RecordWriter};
pub use slice::{BufferSlice, BufferSliceFactory};
pub use snapshot::{BufferSnapshot, BufferState};
