use super::error::SliceError;
use super::record_buffer::{Buffer, RECORD_PREFIX_SIZE};
use super::snapshot::{BufferSnapshot, BufferState};
use bytes::Bytes;
use std::sync::Arc;

/// Record-aligned piece of a snapshot that fits into one request.
#[derive(Clone)]
pub struct BufferSlice {
    source: Arc<Buffer>,
    data: Bytes,
    records_count: usize,
    end: BufferState,
}

impl BufferSlice {
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
        self.data.is_empty()
    }

    pub fn records_count(&self) -> usize {
        self.records_count
    }

    /// Absolute buffer position right after this slice's last record.
    pub fn end(&self) -> BufferState {
        self.end
    }
}

impl std::fmt::Debug for BufferSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferSlice")
            .field("buffer", &self.source.id())
            .field("length", &self.data.len())
            .field("records_count", &self.records_count)
            .field("end", &self.end)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferSliceFactory {
    max_slice_size: usize,
}

impl BufferSliceFactory {
    pub fn new(max_slice_size: usize) -> Self {
        Self { max_slice_size }
    }

    pub fn max_slice_size(&self) -> usize {
        self.max_slice_size
    }

    /// Cuts a snapshot into slices of at most `max_slice_size` bytes without
    /// splitting records.
    pub fn cut(&self, snapshot: &BufferSnapshot) -> Result<Vec<BufferSlice>, SliceError> {
        if snapshot.len() <= self.max_slice_size {
            return Ok(vec![BufferSlice {
                source: Arc::clone(snapshot.source()),
                data: snapshot.data().clone(),
                records_count: snapshot.records_count(),
                end: snapshot.end(),
            }]);
        }

        let data = snapshot.data();
        let mut slices = Vec::new();
        let mut offset = 0;
        let mut records = 0;
        let mut slice_start = BufferState::EMPTY;

        while offset < data.len() {
            let length = framed_length(data, offset)?;
            if length > self.max_slice_size {
                return Err(SliceError::RecordExceedsSlice {
                    length,
                    max_slice_size: self.max_slice_size,
                });
            }

            if offset - slice_start.length + length > self.max_slice_size {
                let current = BufferState::new(offset, records);
                slices.push(self.slice(snapshot, slice_start, current));
                slice_start = current;
            }

            offset += length;
            records += 1;
        }

        let current = BufferState::new(offset, records);
        if current.length > slice_start.length {
            slices.push(self.slice(snapshot, slice_start, current));
        }

        Ok(slices)
    }

    fn slice(&self, snapshot: &BufferSnapshot, from: BufferState, to: BufferState) -> BufferSlice {
        BufferSlice {
            source: Arc::clone(snapshot.source()),
            data: snapshot.data().slice(from.length..to.length),
            records_count: to.records_count - from.records_count,
            end: snapshot.start() + to,
        }
    }
}

/// Framed size of the record starting at `offset`.
fn framed_length(data: &[u8], offset: usize) -> Result<usize, SliceError> {
    let Some(prefix) = data.get(offset..offset + RECORD_PREFIX_SIZE) else {
        return Err(SliceError::CorruptedFraming { offset });
    };

    let mut raw = [0u8; RECORD_PREFIX_SIZE];
    raw.copy_from_slice(prefix);
    let payload = i32::from_be_bytes(raw);
    if payload < 0 {
        return Err(SliceError::CorruptedFraming { offset });
    }

    let length = RECORD_PREFIX_SIZE + payload as usize;
    if offset + length > data.len() {
        return Err(SliceError::CorruptedFraming { offset });
    }
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::memory::MemoryManager;

    fn snapshot(payloads: &[usize]) -> BufferSnapshot {
        let memory = Arc::new(MemoryManager::new(1 << 20));
        assert!(memory.try_reserve(64));
        let buffer = Arc::new(Buffer::new(7, 64, 1 << 16, 1 << 12, memory));
        for (index, &size) in payloads.iter().enumerate() {
            let mut writer = buffer.begin_record().unwrap();
            writer.write_bytes(&vec![index as u8; size]).unwrap();
            writer.commit();
        }
        buffer.try_make_snapshot().unwrap()
    }

    #[test]
    fn test_small_snapshot_is_single_slice() {
        let snapshot = snapshot(&[10, 20]);
        let slices = BufferSliceFactory::new(100).cut(&snapshot).unwrap();

        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].records_count(), 2);
        assert_eq!(slices[0].data(), snapshot.data());
        assert_eq!(slices[0].end(), snapshot.end());
    }

    #[test]
    fn test_records_are_never_split() {
        // Framed sizes: 14, 24, 14, 34
        let snapshot = snapshot(&[10, 20, 10, 30]);
        let slices = BufferSliceFactory::new(40).cut(&snapshot).unwrap();

        let sizes: Vec<_> = slices.iter().map(BufferSlice::len).collect();
        let counts: Vec<_> = slices.iter().map(BufferSlice::records_count).collect();
        assert_eq!(sizes, vec![38, 14, 34]);
        assert_eq!(counts, vec![2, 1, 1]);
        assert_eq!(slices.last().unwrap().end(), snapshot.end());
    }

    #[test]
    fn test_slice_boundaries_are_absolute() {
        let snapshot = snapshot(&[16, 16, 16]);
        let slices = BufferSliceFactory::new(40).cut(&snapshot).unwrap();

        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].end(), BufferState::new(40, 2));
        assert_eq!(slices[1].end(), BufferState::new(60, 3));
    }

    #[test]
    fn test_record_larger_than_slice_fails_fast() {
        let snapshot = snapshot(&[10, 100, 10]);
        let error = BufferSliceFactory::new(50).cut(&snapshot).unwrap_err();

        assert_eq!(
            error,
            SliceError::RecordExceedsSlice {
                length: 104,
                max_slice_size: 50
            }
        );
    }

    #[test]
    fn test_truncated_prefix_is_reported() {
        assert_eq!(
            framed_length(&[0, 0, 0, 9, 1, 2], 0),
            Err(SliceError::CorruptedFraming { offset: 0 })
        );
        assert_eq!(
            framed_length(&[0, 0], 0),
            Err(SliceError::CorruptedFraming { offset: 0 })
        );
    }
}
