use std::time::Instant;

/// A monotonic nanosecond clock. Only differences between two readings are meaningful.
pub trait MonotonicClock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Reads `std::time::Instant`, which is `CLOCK_MONOTONIC` on Linux.
#[derive(Debug, Clone, Copy)]
pub struct InstantClock {
    origin: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for InstantClock {
    #[inline(always)]
    fn now_ns(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}
