use super::backoff::{JitterSource, RandomJitter, equal_jitter, exponential};
use crate::buffer::MemoryManager;
use crate::sender::StreamSendResult;
use std::sync::Arc;
use std::time::Duration;

/// Per-destination send scheduler.
///
/// Successful sends keep the base cadence (or drain immediately while memory
/// is under pressure); failures back off exponentially up to `cap`.
pub struct Planner<J: JitterSource = RandomJitter> {
    memory: Arc<MemoryManager>,
    period: Duration,
    cap: Duration,
    pressure_threshold_percent: u8,
    attempt: u32,
    jitter: J,
}

impl Planner<RandomJitter> {
    pub fn new(
        memory: Arc<MemoryManager>,
        period: Duration,
        cap: Duration,
        pressure_threshold_percent: u8,
    ) -> Self {
        Self::with_jitter(
            memory,
            period,
            cap,
            pressure_threshold_percent,
            RandomJitter::new(),
        )
    }
}

impl<J: JitterSource> Planner<J> {
    pub fn with_jitter(
        memory: Arc<MemoryManager>,
        period: Duration,
        cap: Duration,
        pressure_threshold_percent: u8,
        jitter: J,
    ) -> Self {
        Self {
            memory,
            period,
            cap,
            pressure_threshold_percent,
            attempt: 0,
            jitter,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next cycle, given the result of the last one and how
    /// long it took.
    pub fn next_delay(&mut self, result: StreamSendResult, elapsed: Duration) -> Duration {
        match result {
            StreamSendResult::Success => {
                self.attempt = 0;
                if self.memory.is_over_threshold(self.pressure_threshold_percent) {
                    return Duration::ZERO;
                }
                self.jittered().saturating_sub(elapsed)
            }
            // Only a delivered batch clears the backoff.
            StreamSendResult::NothingToSend => self.jittered().saturating_sub(elapsed),
            StreamSendResult::Failure => {
                self.attempt = self.attempt.saturating_add(1);
                self.jittered()
            }
        }
    }

    fn jittered(&mut self) -> Duration {
        let delay = exponential(self.period, self.cap, self.attempt);
        equal_jitter(delay, &mut self.jitter)
    }
}
