//! Rendezvous primitives used to line up the two workers of a trial.
//!
//! Every call site depends on the [`Rendezvous`] trait only. The backing implementation is
//! selected through [`BarrierKind`] when the sweep is configured:
//! - `Condvar`: a generation-counted mutex/condvar barrier, available on every platform.
//! - `Pthread`: the native `pthread_barrier_t`, Linux only.
//!
//! A barrier is created once per sweep and reused for every trial without reinitialization.
//! Destroying it is handled by `Drop`.
mod condvar;
#[cfg(target_os = "linux")]
mod pthread;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::condvar::CondvarBarrier;
#[cfg(target_os = "linux")]
pub use self::pthread::PthreadBarrier;

#[derive(Error, Debug)]
pub enum BarrierError {
    #[error("a barrier needs at least one participant")]
    InvalidArgument,
    #[error("barrier backend {0:?} is not available on this platform")]
    Unsupported(BarrierKind),
    #[error("barrier initialization failed: {0}")]
    Os(#[from] std::io::Error),
    #[error("barrier wait failed: {0}")]
    Wait(std::io::Error),
}

/// Outcome of a single [`Rendezvous::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    is_leader: bool,
}

impl BarrierWaitResult {
    pub(crate) fn leader() -> Self {
        Self { is_leader: true }
    }
    pub(crate) fn follower() -> Self {
        Self { is_leader: false }
    }
    /// True for exactly one caller per release: the one whose arrival completed the count.
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

/// A reusable N-party barrier.
pub trait Rendezvous: Send + Sync {
    /// Block until `participants()` calls have been made since the last release.
    ///
    /// The arrival count is reset on release, so the same instance serves the next round.
    /// An error leaves the barrier in an unknown state; the caller must not wait on it again.
    fn wait(&self) -> Result<BarrierWaitResult, BarrierError>;
    /// The number of callers that make up one release.
    fn participants(&self) -> usize;
}

/// Selects the [`Rendezvous`] implementation.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarrierKind {
    /// Mutex and condition variable with a generation counter. Works everywhere.
    #[default]
    Condvar,
    /// The native `pthread_barrier_t`. Linux only.
    Pthread,
}

pub fn construct_barrier(
    kind: BarrierKind,
    participants: usize,
) -> Result<Box<dyn Rendezvous>, BarrierError> {
    match kind {
        BarrierKind::Condvar => Ok(Box::new(CondvarBarrier::new(participants)?)),
        #[cfg(target_os = "linux")]
        BarrierKind::Pthread => Ok(Box::new(PthreadBarrier::new(participants)?)),
        #[cfg(not(target_os = "linux"))]
        BarrierKind::Pthread => Err(BarrierError::Unsupported(kind)),
    }
}
