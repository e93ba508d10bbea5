// Lock-free per-destination statistics.
//
// Every counter is an independent atomic; a snapshot is consistent per field
// but not across fields.

use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a [`StatisticsCollector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCounters {
    pub lost_records: u64,
    pub lost_size: u64,
    pub sent_records: u64,
    pub sent_size: u64,
    pub stored_records: u64,
    pub stored_size: u64,
    pub write_failures: u64,
    pub overflows: u64,
    pub too_large_records: u64,
}

impl Add for SinkCounters {
    type Output = SinkCounters;

    fn add(self, rhs: SinkCounters) -> SinkCounters {
        SinkCounters {
            lost_records: self.lost_records + rhs.lost_records,
            lost_size: self.lost_size + rhs.lost_size,
            sent_records: self.sent_records + rhs.sent_records,
            sent_size: self.sent_size + rhs.sent_size,
            stored_records: self.stored_records + rhs.stored_records,
            stored_size: self.stored_size + rhs.stored_size,
            write_failures: self.write_failures + rhs.write_failures,
            overflows: self.overflows + rhs.overflows,
            too_large_records: self.too_large_records + rhs.too_large_records,
        }
    }
}

impl std::iter::Sum for SinkCounters {
    fn sum<I: Iterator<Item = SinkCounters>>(iter: I) -> SinkCounters {
        iter.fold(SinkCounters::default(), Add::add)
    }
}

#[derive(Debug, Default)]
pub struct StatisticsCollector {
    lost_records: AtomicU64,
    lost_size: AtomicU64,
    sent_records: AtomicU64,
    sent_size: AtomicU64,
    stored_records: AtomicU64,
    stored_size: AtomicU64,
    write_failures: AtomicU64,
    overflows: AtomicU64,
    too_large_records: AtomicU64,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record was committed into a buffer.
    pub fn report_stored_record(&self, size: usize) {
        self.stored_records.fetch_add(1, Ordering::Relaxed);
        self.stored_size.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn report_successful_sending(&self, records: usize, size: usize) {
        self.sent_records.fetch_add(records as u64, Ordering::Relaxed);
        self.sent_size.fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Records handed to the gate and definitively rejected.
    pub fn report_sending_failure(&self, records: usize, size: usize) {
        self.lost_records.fetch_add(records as u64, Ordering::Relaxed);
        self.lost_size.fetch_add(size as u64, Ordering::Relaxed);
    }

    // Admission drops below count as lost records but carry no lost size.

    /// The encoder failed; the partial record was rolled back.
    pub fn report_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
        self.lost_records.fetch_add(1, Ordering::Relaxed);
    }

    /// No buffer could take the record.
    pub fn report_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
        self.lost_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_too_large_record(&self) {
        self.too_large_records.fetch_add(1, Ordering::Relaxed);
        self.lost_records.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes committed and not yet sent or lost.
    pub fn estimate_stored_size(&self) -> u64 {
        let stored = self.stored_size.load(Ordering::Relaxed);
        let sent = self.sent_size.load(Ordering::Relaxed);
        let lost = self.lost_size.load(Ordering::Relaxed);
        stored.saturating_sub(sent + lost)
    }

    pub fn get(&self) -> SinkCounters {
        SinkCounters {
            lost_records: self.lost_records.load(Ordering::Relaxed),
            lost_size: self.lost_size.load(Ordering::Relaxed),
            sent_records: self.sent_records.load(Ordering::Relaxed),
            sent_size: self.sent_size.load(Ordering::Relaxed),
            stored_records: self.stored_records.load(Ordering::Relaxed),
            stored_size: self.stored_size.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            too_large_records: self.too_large_records.load(Ordering::Relaxed),
        }
    }
}
