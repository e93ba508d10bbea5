use super::slice::BufferSlice;
use std::iter::Peekable;

/// Slices that go out together in one request.
#[derive(Debug, Clone, Default)]
pub struct SliceBatch {
    slices: Vec<BufferSlice>,
}

impl SliceBatch {
    pub fn slices(&self) -> &[BufferSlice] {
        &self.slices
    }

    pub fn len(&self) -> usize {
        self.slices.iter().map(BufferSlice::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn records_count(&self) -> usize {
        self.slices.iter().map(BufferSlice::records_count).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferSnapshotBatcher {
    max_batch_size: usize,
}

impl BufferSnapshotBatcher {
    pub fn new(max_batch_size: usize) -> Self {
        Self { max_batch_size }
    }

    /// Greedily groups consecutive slices while their total length stays
    /// within `max_batch_size`. A slice is never split; a slice that is
    /// larger than the cap on its own still forms a batch.
    pub fn batch<I>(&self, slices: I) -> Batches<I::IntoIter>
    where
        I: IntoIterator<Item = BufferSlice>,
    {
        Batches {
            slices: slices.into_iter().peekable(),
            max_batch_size: self.max_batch_size,
        }
    }
}

/// Lazy sequence of batches produced by [`BufferSnapshotBatcher::batch`].
pub struct Batches<I: Iterator<Item = BufferSlice>> {
    slices: Peekable<I>,
    max_batch_size: usize,
}

impl<I: Iterator<Item = BufferSlice>> Iterator for Batches<I> {
    type Item = SliceBatch;

    fn next(&mut self) -> Option<SliceBatch> {
        let first = self.slices.next()?;
        let mut length = first.len();
        let mut slices = vec![first];

        while let Some(next) = self
            .slices
            .next_if(|slice| length + slice.len() <= self.max_batch_size)
        {
            length += next.len();
            slices.push(next);
        }

        Some(SliceBatch { slices })
    }
}
