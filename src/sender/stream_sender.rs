use super::content::build_request_body;
use super::stats::StatisticsCollector;
use super::transport::{GateTransport, SendStatus};
use crate::buffer::{BufferPool, BufferSliceFactory, BufferSnapshotBatcher, SliceBatch};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSendResult {
    NothingToSend,
    Success,
    Failure,
}

/// Runs send cycles for one destination: snapshot every buffer of the pool,
/// cut and batch the snapshots, transmit batches in order, account and mark
/// what may be reclaimed.
pub struct StreamSender<T: GateTransport> {
    stream: String,
    pool: Arc<BufferPool>,
    stats: Arc<StatisticsCollector>,
    transport: Arc<T>,
    slicer: BufferSliceFactory,
    batcher: BufferSnapshotBatcher,
    request_timeout: Duration,
}

impl<T: GateTransport> StreamSender<T> {
    pub fn new(
        stream: impl Into<String>,
        pool: Arc<BufferPool>,
        stats: Arc<StatisticsCollector>,
        transport: Arc<T>,
        max_slice_size: usize,
        request_timeout: Duration,
    ) -> Self {
        Self {
            stream: stream.into(),
            pool,
            stats,
            transport,
            slicer: BufferSliceFactory::new(max_slice_size),
            batcher: BufferSnapshotBatcher::new(max_slice_size),
            request_timeout,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub async fn send_once(&self, api_key: &str, cancel: &CancellationToken) -> StreamSendResult {
        let snapshots = self.pool.make_snapshots();
        if snapshots.is_empty() {
            return StreamSendResult::NothingToSend;
        }

        let mut slices = Vec::new();
        for snapshot in &snapshots {
            match self.slicer.cut(snapshot) {
                Ok(cut) => slices.extend(cut),
                Err(e) => {
                    error!(
                        stream = %self.stream,
                        buffer = snapshot.source().id(),
                        error = %e,
                        "Cannot slice buffer snapshot, max record size is misconfigured"
                    );
                    return StreamSendResult::Failure;
                }
            }
        }

        for batch in self.batcher.batch(slices) {
            if cancel.is_cancelled() {
                debug!(stream = %self.stream, "Send cycle cancelled, keeping unsent batches");
                return StreamSendResult::Failure;
            }

            let records = batch.records_count();
            let size = batch.len();
            let body = build_request_body(&batch);

            let started = Instant::now();
            let outcome = self
                .transport
                .send(&self.stream, api_key, body, self.request_timeout, cancel)
                .await;
            let elapsed = started.elapsed();

            match outcome.status {
                SendStatus::Success => {
                    info!(
                        stream = %self.stream,
                        records,
                        bytes = size,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Sent records"
                    );
                    self.stats.report_successful_sending(records, size);
                    Self::request_garbage_collection(&batch);
                }
                SendStatus::Definitive => {
                    warn!(
                        stream = %self.stream,
                        records,
                        bytes = size,
                        code = %outcome.code,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Gate rejected records, dropping them"
                    );
                    self.stats.report_sending_failure(records, size);
                    Self::request_garbage_collection(&batch);
                    return StreamSendResult::Failure;
                }
                SendStatus::Intermittent => {
                    warn!(
                        stream = %self.stream,
                        records,
                        bytes = size,
                        code = %outcome.code,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Failed to send records, will retry"
                    );
                    return StreamSendResult::Failure;
                }
            }
        }

        StreamSendResult::Success
    }

    fn request_garbage_collection(batch: &SliceBatch) {
        for slice in batch.slices() {
            slice.source().request_garbage_collection(slice.end());
        }
    }
}
