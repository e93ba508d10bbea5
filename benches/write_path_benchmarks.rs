use bytes::Bytes;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use gate_sink::buffer::{
    BufferPool, BufferSliceFactory, BufferSnapshot, BufferSnapshotBatcher, MemoryManager,
    PoolLimits,
};
use gate_sink::sender::{GateTransport, ResponseCode, SendOutcome, build_request_body};
use gate_sink::{GateSink, SinkSettings};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const RECORD: &[u8] = br#"{"level":"info","message":"GET /api/health 200 612","service":"gateway"}"#;
const RECORDS_PER_ITER: usize = 1_000;

fn pool() -> BufferPool {
    BufferPool::new(
        Arc::new(MemoryManager::new(256 << 20)),
        PoolLimits {
            initial_buffer_size: 64 << 10,
            max_buffer_size: 16 << 20,
            max_record_size: 1 << 20,
        },
    )
}

fn filled_snapshot(records: usize) -> BufferSnapshot {
    let pool = pool();
    let lease = pool.try_acquire().unwrap();
    for _ in 0..records {
        let mut writer = lease.begin_record().unwrap();
        writer.write_bytes(RECORD).unwrap();
        writer.commit();
    }
    lease.buffer().try_make_snapshot().unwrap()
}

struct NullTransport;

impl GateTransport for NullTransport {
    async fn send(
        &self,
        _stream: &str,
        _api_key: &str,
        body: Bytes,
        _timeout: Duration,
        _cancel: &CancellationToken,
    ) -> SendOutcome {
        black_box(body);
        ResponseCode::Http(200).into()
    }
}

fn benchmark_buffer_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer_writes");
    group.throughput(Throughput::Elements(RECORDS_PER_ITER as u64));

    group.bench_function("lease_and_commit", |b| {
        b.iter_batched(
            pool,
            |pool| {
                for _ in 0..RECORDS_PER_ITER {
                    let lease = pool.try_acquire().unwrap();
                    let mut writer = lease.begin_record().unwrap();
                    writer.write_bytes(black_box(RECORD)).unwrap();
                    black_box(writer.commit());
                }
                pool
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("sink_put_bytes", |b| {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let settings = SinkSettings {
            send_period: Duration::from_millis(50),
            ..SinkSettings::default()
        };
        let sink = GateSink::with_transport(settings, NullTransport).unwrap();

        b.iter(|| {
            for _ in 0..RECORDS_PER_ITER {
                black_box(sink.put_bytes("bench", black_box(RECORD)));
            }
        });

        runtime.block_on(sink.shutdown());
    });

    group.finish();
}

fn benchmark_slicing(c: &mut Criterion) {
    let snapshot = filled_snapshot(50_000);
    let mut group = c.benchmark_group("slicing");
    group.throughput(Throughput::Bytes(snapshot.len() as u64));

    group.bench_function("cut_64k_slices", |b| {
        let slicer = BufferSliceFactory::new(64 << 10);
        b.iter(|| black_box(slicer.cut(black_box(&snapshot)).unwrap()));
    });

    group.bench_function("cut_batch_and_frame", |b| {
        let slicer = BufferSliceFactory::new(64 << 10);
        let batcher = BufferSnapshotBatcher::new(1 << 20);
        b.iter(|| {
            let slices = slicer.cut(&snapshot).unwrap();
            for batch in batcher.batch(slices) {
                black_box(build_request_body(&batch));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_buffer_writes, benchmark_slicing);
criterion_main!(benches);
