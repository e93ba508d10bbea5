use crate::buffer::SliceBatch;
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the record count that opens every request body.
pub const RECORDS_COUNT_SIZE: usize = std::mem::size_of::<i32>();

/// Request body for one batch: big-endian record count followed by the
/// slices exactly as they are laid out in their buffers.
pub fn build_request_body(batch: &SliceBatch) -> Bytes {
    let mut body = BytesMut::with_capacity(RECORDS_COUNT_SIZE + batch.len());
    body.put_i32(batch.records_count() as i32);
    for slice in batch.slices() {
        body.put_slice(slice.data());
    }
    body.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Buffer, BufferSliceFactory, BufferSnapshotBatcher, MemoryManager};
    use std::sync::Arc;

    #[test]
    fn test_body_layout() {
        let memory = Arc::new(MemoryManager::new(1024));
        assert!(memory.try_reserve(64));
        let buffer = Arc::new(Buffer::new(1, 64, 512, 128, memory));
        for payload in [&b"ab"[..], &b"cde"[..]] {
            let mut writer = buffer.begin_record().unwrap();
            writer.write_bytes(payload).unwrap();
            writer.commit();
        }

        let snapshot = buffer.try_make_snapshot().unwrap();
        let slices = BufferSliceFactory::new(100).cut(&snapshot).unwrap();
        let batch = BufferSnapshotBatcher::new(100).batch(slices).next().unwrap();

        let body = build_request_body(&batch);
        assert_eq!(
            &body[..],
            &[0, 0, 0, 2, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 3, b'c', b'd', b'e']
        );
    }
}
