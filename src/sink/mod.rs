mod job;
pub mod settings;
pub mod stream;

pub use settings::{SettingsError, SinkSettings, StreamSettings};
pub use stream::StreamState;

use crate::buffer::{BufferError, BufferPool, MemoryManager, RECORD_PREFIX_SIZE};
use crate::record::{EventRecord, RawRecord, RecordEncoder};
use crate::reliability::Planner;
use crate::sender::{
    GateTransport, HttpGateTransport, HttpTransportConfig, SinkCounters, StreamSender,
    TransportError,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid sink settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("Gate sink must be created inside a Tokio runtime")]
    NoRuntime,
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No buffer could be created within the memory budget.
    PoolExhausted,
    /// The leased buffer could not grow to fit the record.
    Overflow,
    TooLarge,
    EncodeFailed,
}

/// Result of [`GateSink::put`]. Dropped records are already counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { size: usize },
    Dropped(DropReason),
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored { .. })
    }
}

/// Buffers records per stream and ships them to the gate in the background.
///
/// `put` never blocks and never fails loudly: under pressure records are
/// dropped and counted. One sending job per stream is spawned on the runtime
/// the sink was created in.
pub struct GateSink<T: GateTransport = HttpGateTransport> {
    settings: SinkSettings,
    memory: Arc<MemoryManager>,
    transport: Arc<T>,
    default_api_key: Arc<str>,
    streams: DashMap<String, Arc<StreamState>>,
    runtime: Handle,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl GateSink<HttpGateTransport> {
    pub fn new(settings: SinkSettings) -> Result<Self, SinkError> {
        let mut transport_config = HttpTransportConfig::new(settings.gate_url.clone());
        transport_config.connection_timeout = settings.request_timeout;
        let transport = HttpGateTransport::new(transport_config)?;
        Self::with_transport(settings, transport)
    }
}

impl<T: GateTransport> GateSink<T> {
    pub fn with_transport(settings: SinkSettings, transport: T) -> Result<Self, SinkError> {
        settings.validate()?;
        let runtime = Handle::try_current().map_err(|_| SinkError::NoRuntime)?;

        Ok(Self {
            memory: Arc::new(MemoryManager::new(settings.max_memory)),
            transport: Arc::new(transport),
            default_api_key: Arc::from(settings.api_key.as_str()),
            streams: DashMap::new(),
            runtime,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            settings,
        })
    }

    pub fn settings(&self) -> &SinkSettings {
        &self.settings
    }

    /// Writes one record into `stream`, creating the stream on first use.
    pub fn put<E: RecordEncoder + ?Sized>(&self, stream: &str, record: &E) -> PutOutcome {
        let state = self.obtain_stream(stream);
        let stats = state.statistics();

        if let Some(payload) = record.size_hint() {
            let size = RECORD_PREFIX_SIZE + payload;
            if size > self.settings.max_record_size {
                stats.report_too_large_record();
                debug!(stream, size, "Dropped record, too large");
                return PutOutcome::Dropped(DropReason::TooLarge);
            }
        }

        let pool = state.pool();
        let lease = match pool.try_acquire() {
            Ok(lease) => lease,
            Err(e) => {
                stats.report_overflow();
                state.request_flush();
                debug!(stream, error = %e, "Dropped record, no buffer available");
                return PutOutcome::Dropped(DropReason::PoolExhausted);
            }
        };

        let outcome = match lease.begin_record() {
            Ok(mut writer) => match record.encode(&mut writer) {
                Ok(()) => {
                    let size = writer.commit();
                    stats.report_stored_record(size);
                    PutOutcome::Stored { size }
                }
                Err(e) => {
                    let failure = writer.take_failure();
                    drop(writer);
                    let reason = Self::report_drop(&state, failure.as_ref());
                    debug!(stream, error = %e, ?reason, "Dropped record");
                    PutOutcome::Dropped(reason)
                }
            },
            Err(e) => {
                let reason = Self::report_drop(&state, Some(&e));
                debug!(stream, error = %e, ?reason, "Dropped record");
                PutOutcome::Dropped(reason)
            }
        };

        if pool.is_almost_full(&lease)
            || self
                .memory
                .is_over_threshold(self.settings.flush_memory_threshold_percent)
        {
            state.request_flush();
        }
        pool.release(lease);

        outcome
    }

    pub fn put_bytes(&self, stream: &str, payload: &[u8]) -> PutOutcome {
        self.put(stream, &RawRecord(payload))
    }

    pub fn put_event(&self, stream: &str, event: &EventRecord) -> PutOutcome {
        self.put(stream, event)
    }

    pub fn configure_stream(&self, stream: &str, settings: StreamSettings) {
        self.obtain_stream(stream).configure(settings);
    }

    /// Counters summed over every stream.
    pub fn statistics(&self) -> SinkCounters {
        self.streams
            .iter()
            .map(|entry| entry.value().statistics().get())
            .sum()
    }

    pub fn stream_statistics(&self, stream: &str) -> Option<SinkCounters> {
        self.streams
            .get(stream)
            .map(|entry| entry.value().statistics().get())
    }

    /// Bytes currently reserved by buffers of all streams.
    pub fn memory_usage(&self) -> usize {
        self.memory.reserved_bytes()
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Stops every sending job, waits for in-flight requests to finish and
    /// frees all buffers.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        let freed: usize = self
            .streams
            .iter()
            .map(|entry| entry.value().pool().free_all())
            .sum();

        info!(
            streams = self.streams.len(),
            freed_buffers = freed,
            reserved_bytes = self.memory.reserved_bytes(),
            "Gate sink shut down"
        );
    }

    fn obtain_stream(&self, name: &str) -> Arc<StreamState> {
        if let Some(state) = self.streams.get(name) {
            return Arc::clone(state.value());
        }

        match self.streams.entry(name.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let pool = BufferPool::new(Arc::clone(&self.memory), self.settings.pool_limits());
                let state = Arc::new(StreamState::new(name, pool));
                entry.insert(Arc::clone(&state));
                self.spawn_job(Arc::clone(&state));
                state
            }
        }
    }

    fn spawn_job(&self, state: Arc<StreamState>) {
        let sender = StreamSender::new(
            state.name(),
            Arc::clone(state.pool()),
            Arc::clone(state.statistics()),
            Arc::clone(&self.transport),
            self.settings.max_slice_size(),
            self.settings.request_timeout,
        );
        let planner = Planner::new(
            Arc::clone(&self.memory),
            self.settings.send_period,
            self.settings.send_period_cap,
            self.settings.pressure_threshold_percent,
        );

        self.tracker.spawn_on(
            job::run_sending_job(
                state,
                sender,
                planner,
                Arc::clone(&self.default_api_key),
                self.cancel.clone(),
            ),
            &self.runtime,
        );
    }

    fn report_drop(state: &StreamState, failure: Option<&BufferError>) -> DropReason {
        let stats = state.statistics();
        match failure {
            Some(BufferError::RecordTooLarge { .. }) => {
                stats.report_too_large_record();
                DropReason::TooLarge
            }
            Some(error) if error.is_capacity_related() => {
                stats.report_overflow();
                state.request_flush();
                DropReason::Overflow
            }
            _ => {
                stats.report_write_failure();
                DropReason::EncodeFailed
            }
        }
    }
}

impl<T: GateTransport> Drop for GateSink<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
