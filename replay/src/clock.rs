use std::time::Instant;

use crate::ReplayError;

/// Monotonic nanosecond timestamps for per-operation timing.
pub trait Clock {
    fn now_ns(&self) -> Result<u64, ReplayError>;
}

/// Nanoseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> Result<u64, ReplayError> {
        Ok(self.origin.elapsed().as_nanos() as u64)
    }
}
