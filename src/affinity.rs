//! Best-effort pinning of the calling thread to one logical core.
//!
//! Pinning is advisory. A worker that cannot be pinned keeps running wherever the scheduler
//! puts it, which makes the measurement noisier but not wrong.
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AffinityError {
    #[error("core pinning is not supported here")]
    Unsupported,
    #[error("core {core} is outside the range of the cpu set (max {max})")]
    CoreOutOfRange { core: usize, max: usize },
    #[error("pinning to core {core} failed: {source}")]
    Os {
        core: usize,
        #[source]
        source: std::io::Error,
    },
}

pub trait CoreBinder: Send + Sync {
    /// Ask the platform to run the calling thread only on `core`.
    fn bind_current_thread(&self, core: usize) -> Result<(), AffinityError>;
}

/// Pins through `sched_setaffinity` on the calling thread.
#[cfg(target_os = "linux")]
#[derive(Debug, Default)]
pub struct SchedAffinity;

#[cfg(target_os = "linux")]
impl CoreBinder for SchedAffinity {
    fn bind_current_thread(&self, core: usize) -> Result<(), AffinityError> {
        use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};

        let max = CPU_SETSIZE as usize;
        if core >= max {
            return Err(AffinityError::CoreOutOfRange { core, max });
        }
        unsafe {
            let mut cpuset: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut cpuset);
            CPU_SET(core, &mut cpuset);

            // pid 0 targets the calling thread
            let result = sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &cpuset);
            if result != 0 {
                return Err(AffinityError::Os {
                    core,
                    source: std::io::Error::last_os_error(),
                });
            }
        }
        Ok(())
    }
}

/// Never pins. Used where the platform offers no pinning, or when pinning is switched off.
#[derive(Debug, Default)]
pub struct NoAffinity;

impl CoreBinder for NoAffinity {
    fn bind_current_thread(&self, _core: usize) -> Result<(), AffinityError> {
        Err(AffinityError::Unsupported)
    }
}

pub fn construct_core_binder(pin: bool) -> Box<dyn CoreBinder> {
    if !pin {
        return Box::new(NoAffinity);
    }
    #[cfg(target_os = "linux")]
    return Box::new(SchedAffinity);
    #[cfg(not(target_os = "linux"))]
    return Box::new(NoAffinity);
}

static WARNED_UNPINNED: AtomicBool = AtomicBool::new(false);

/// Pin the calling thread to `core`, falling back to running unpinned.
///
/// Returns whether the thread is pinned. Only the first failure in the process is logged at
/// `warn` level, later ones go to `debug`.
pub fn bind_current_thread_to_core(binder: &dyn CoreBinder, core: usize) -> bool {
    match binder.bind_current_thread(core) {
        Ok(()) => true,
        Err(e) => {
            if WARNED_UNPINNED.swap(true, Ordering::Relaxed) {
                debug!("Running unpinned: {}", e);
            } else {
                warn!("Running unpinned, measurements will be noisier: {}", e);
            }
            false
        }
    }
}

/// Number of logical cores this process may run on.
pub fn available_core_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
