use super::settings::StreamSettings;
use crate::buffer::BufferPool;
use crate::sender::StatisticsCollector;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Everything the sink keeps for one destination stream.
#[derive(Debug)]
pub struct StreamState {
    name: String,
    pool: Arc<BufferPool>,
    stats: Arc<StatisticsCollector>,
    settings: RwLock<StreamSettings>,
    flush_needed: AtomicBool,
    flush: Notify,
}

impl StreamState {
    pub fn new(name: impl Into<String>, pool: BufferPool) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            stats: Arc::new(StatisticsCollector::new()),
            settings: RwLock::new(StreamSettings::default()),
            flush_needed: AtomicBool::new(false),
            flush: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn statistics(&self) -> &Arc<StatisticsCollector> {
        &self.stats
    }

    pub fn configure(&self, settings: StreamSettings) {
        *self.settings.write() = settings;
    }

    /// The stream's own API key, or `default` when none is configured.
    pub fn api_key(&self, default: &str) -> String {
        self.settings
            .read()
            .api_key
            .clone()
            .unwrap_or_else(|| default.to_string())
    }

    /// Wakes the sending job before its planned delay runs out.
    pub fn request_flush(&self) {
        if !self.flush_needed.swap(true, Ordering::AcqRel) {
            self.flush.notify_one();
        }
    }

    pub fn is_flush_requested(&self) -> bool {
        self.flush_needed.load(Ordering::Acquire)
    }

    /// Forgets requests made before the cycle that is about to run.
    pub(crate) fn reset_flush(&self) {
        self.flush_needed.store(false, Ordering::Release);
    }

    pub(crate) async fn flush_requested(&self) {
        loop {
            let notified = self.flush.notified();
            if self.is_flush_requested() {
                return;
            }
            notified.await;
            if self.is_flush_requested() {
                return;
            }
        }
    }
}
