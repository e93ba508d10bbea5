use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-wide byte budget shared by every buffer pool.
///
/// Reservations go through a compare-and-swap loop so the counter can never
/// exceed `max_memory`, no matter how many threads race on it.
#[derive(Debug)]
pub struct MemoryManager {
    max_memory: usize,
    reserved: AtomicUsize,
}

impl MemoryManager {
    pub fn new(max_memory: usize) -> Self {
        Self {
            max_memory,
            reserved: AtomicUsize::new(0),
        }
    }

    pub fn try_reserve(&self, amount: usize) -> bool {
        let mut current = self.reserved.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(amount) else {
                return false;
            };
            if next > self.max_memory {
                return false;
            }

            match self.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns bytes obtained through [`try_reserve`](Self::try_reserve).
    pub fn release(&self, amount: usize) {
        let mut current = self.reserved.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_sub(amount);
            match self.reserved.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_over_threshold(&self, percent: u8) -> bool {
        let reserved = self.reserved.load(Ordering::Relaxed) as u128;
        reserved * 100 >= self.max_memory as u128 * percent as u128
    }

    pub fn reserved_bytes(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory
    }
}
