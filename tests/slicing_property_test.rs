mod common;

use common::decode_records;
use gate_sink::buffer::{
    BufferPool, BufferSliceFactory, BufferSnapshotBatcher, MemoryManager, PoolLimits,
};
use proptest::prelude::*;
use std::sync::Arc;

const MAX_RECORD: usize = 64;

fn payloads() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(
        prop::collection::vec(any::<u8>(), 0..=MAX_RECORD - 4),
        1..60,
    )
}

fn pool_with(records: &[Vec<u8>]) -> BufferPool {
    let pool = BufferPool::new(
        Arc::new(MemoryManager::new(1 << 20)),
        PoolLimits {
            initial_buffer_size: 32,
            max_buffer_size: 64 * 1024,
            max_record_size: MAX_RECORD,
        },
    );
    let lease = pool.try_acquire().unwrap();
    for record in records {
        let mut writer = lease.begin_record().unwrap();
        writer.write_bytes(record).unwrap();
        writer.commit();
    }
    drop(lease);
    pool
}

proptest! {
    #[test]
    fn slices_never_split_records(
        records in payloads(),
        max_slice in MAX_RECORD..400usize,
    ) {
        let pool = pool_with(&records);
        let snapshot = pool.make_snapshots().pop().unwrap();
        let slices = BufferSliceFactory::new(max_slice).cut(&snapshot).unwrap();

        let mut rebuilt = Vec::new();
        let mut previous_end = snapshot.start();
        for slice in &slices {
            prop_assert!(!slice.is_empty());
            prop_assert!(slice.len() <= max_slice);
            prop_assert!(slice.end() > previous_end);

            let decoded = decode_records(slice.data());
            prop_assert_eq!(decoded.len(), slice.records_count());
            rebuilt.extend(decoded);
            previous_end = slice.end();
        }

        prop_assert_eq!(previous_end, snapshot.end());
        prop_assert_eq!(rebuilt, records);
    }

    #[test]
    fn batches_respect_size_and_order(
        records in payloads(),
        max_slice in MAX_RECORD..200usize,
        max_batch in 200..600usize,
    ) {
        let pool = pool_with(&records);
        let snapshot = pool.make_snapshots().pop().unwrap();
        let slices = BufferSliceFactory::new(max_slice).cut(&snapshot).unwrap();
        let slice_count = slices.len();

        let batches: Vec<_> = BufferSnapshotBatcher::new(max_batch).batch(slices).collect();

        let mut rebuilt = Vec::new();
        let mut total_slices = 0;
        for batch in &batches {
            prop_assert!(!batch.is_empty());
            prop_assert!(batch.len() <= max_batch);
            total_slices += batch.slices().len();
            for slice in batch.slices() {
                rebuilt.extend(decode_records(slice.data()));
            }
        }

        prop_assert_eq!(total_slices, slice_count);
        prop_assert_eq!(rebuilt, records);
    }
}
