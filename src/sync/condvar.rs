use std::sync::{Condvar, Mutex, PoisonError};

use super::{BarrierError, BarrierWaitResult, Rendezvous};

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// Mutex/condvar barrier.
///
/// Waiters park until the generation they arrived in has been released, so a woken waiter
/// can never mistake arrivals for the next round as its own.
#[derive(Debug)]
pub struct CondvarBarrier {
    state: Mutex<BarrierState>,
    released: Condvar,
    participants: usize,
}

impl CondvarBarrier {
    pub fn new(participants: usize) -> Result<Self, BarrierError> {
        if participants == 0 {
            return Err(BarrierError::InvalidArgument);
        }
        Ok(Self {
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            participants,
        })
    }
}

#[cfg(test)]
impl CondvarBarrier {
    /// Number of releases performed so far.
    fn generation(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }
}

impl Rendezvous for CondvarBarrier {
    fn wait(&self) -> Result<BarrierWaitResult, BarrierError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.participants {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            trace!("barrier released, generation {}", state.generation);
            drop(state);
            self.released.notify_all();
            return Ok(BarrierWaitResult::leader());
        }
        let _state = self
            .released
            .wait_while(state, |s| s.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        Ok(BarrierWaitResult::follower())
    }

    fn participants(&self) -> usize {
        self.participants
    }
}
