use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Source of uniformly distributed random delays.
pub trait JitterSource: Send {
    /// Returns a duration in `[0, upper]`.
    fn sample(&mut self, upper: Duration) -> Duration;
}

/// `StdRng` backed jitter, one instance per scheduling task.
#[derive(Debug, Clone)]
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterSource for RandomJitter {
    fn sample(&mut self, upper: Duration) -> Duration {
        let upper = upper.as_nanos().min(u64::MAX as u128) as u64;
        if upper == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.rng.random_range(0..=upper))
    }
}

/// `min(cap, base * 2^attempt)`, saturating at `cap`.
pub fn exponential(base: Duration, cap: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|multiplier| base.checked_mul(multiplier))
        .map_or(cap, |delay| delay.min(cap))
}

/// `delay / 2 + random(0, delay / 2)`
pub fn equal_jitter(delay: Duration, jitter: &mut impl JitterSource) -> Duration {
    let half = delay / 2;
    half + jitter.sample(half)
}

/// `random(0, delay)`
pub fn full_jitter(delay: Duration, jitter: &mut impl JitterSource) -> Duration {
    jitter.sample(delay)
}

/// `min(cap, random(base, previous * 3))`
pub fn decorrelated_jitter(
    base: Duration,
    cap: Duration,
    previous: Duration,
    jitter: &mut impl JitterSource,
) -> Duration {
    let upper = previous.saturating_mul(3).max(base);
    (base + jitter.sample(upper - base)).min(cap)
}
