//! The ping-pong protocol between the two roles of a trial.
//!
//! A single [`SharedFlag`] bounces between two values. The [`Flipper`] waits for it to be
//! `RAISED` and lowers it, the [`Timer`] waits for it to be `LOWERED` and raises it again.
//! Each transition is a `compare_exchange` with relaxed ordering retried in a tight spin, so
//! only one side can ever succeed at a time and the value strictly alternates.
//!
//! The spin is deliberate: any backoff in the Timer's loop would be measured as latency.
use std::sync::atomic::{AtomicBool, Ordering};

use crate::clock::MonotonicClock;

const RAISED: bool = true;
const LOWERED: bool = false;

/// The flag the two roles hand back and forth, alone on its cache line.
#[repr(align(64))]
#[derive(Debug)]
pub struct SharedFlag {
    value: AtomicBool,
}

impl SharedFlag {
    pub const fn new() -> Self {
        Self {
            value: AtomicBool::new(RAISED),
        }
    }

    /// Put the flag back into its pre-trial state.
    pub fn reset(&self) {
        self.value.store(RAISED, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.value.load(Ordering::SeqCst) == RAISED
    }

    /// Spin until the flag reads `from`, then swap in `to`. Returns the number of successful
    /// exchanges, which is always one.
    #[inline(always)]
    fn handoff(&self, from: bool, to: bool) -> usize {
        loop {
            if self
                .value
                .compare_exchange(from, to, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return 1;
            }
        }
    }
}

impl Default for SharedFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowers the flag whenever it is raised. Takes no timestamps.
pub struct Flipper<'a> {
    flag: &'a SharedFlag,
}

impl<'a> Flipper<'a> {
    pub fn new(flag: &'a SharedFlag) -> Self {
        Self { flag }
    }

    /// Perform `iterations` handoffs and return how many exchanges succeeded.
    #[inline(never)]
    pub fn run(&self, iterations: usize) -> usize {
        let mut handoffs = 0;
        for _ in 0..iterations {
            handoffs += self.flag.handoff(RAISED, LOWERED);
        }
        handoffs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerOutcome {
    pub elapsed_ns: u64,
    pub handoffs: usize,
}

impl TimerOutcome {
    pub fn latency_ns(&self) -> f64 {
        one_way_latency_ns(self.elapsed_ns, self.handoffs)
    }
}

/// Raises the flag whenever it is lowered and times the whole loop.
pub struct Timer<'a> {
    flag: &'a SharedFlag,
    clock: &'a dyn MonotonicClock,
}

impl<'a> Timer<'a> {
    pub fn new(flag: &'a SharedFlag, clock: &'a dyn MonotonicClock) -> Self {
        Self { flag, clock }
    }

    /// Perform `iterations` handoffs, reading the clock right before the first attempt and
    /// right after the last success.
    #[inline(never)]
    pub fn run(&self, iterations: usize) -> TimerOutcome {
        let mut handoffs = 0;
        let start = self.clock.now_ns();
        for _ in 0..iterations {
            handoffs += self.flag.handoff(LOWERED, RAISED);
        }
        let end = self.clock.now_ns();
        TimerOutcome {
            elapsed_ns: end.saturating_sub(start),
            handoffs,
        }
    }
}

/// One-way latency estimate for `iterations` round trips that took `elapsed_ns` in total.
///
/// A round trip is one wait for the Flipper plus one wait for the Timer, half of it is one
/// message. `iterations` must be non-zero.
pub fn one_way_latency_ns(elapsed_ns: u64, iterations: usize) -> f64 {
    debug_assert!(iterations > 0);
    elapsed_ns as f64 / iterations as f64 / 2.0
}
