pub mod backoff;
pub mod planner;

pub use backoff::{
    JitterSource, RandomJitter, decorrelated_jitter, equal_jitter, exponential, full_jitter,
};
pub use planner::Planner;
