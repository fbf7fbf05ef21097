use std::{cell::UnsafeCell, io, mem, ptr};

use super::{BarrierError, BarrierWaitResult, Rendezvous};

/// The platform `pthread_barrier_t`.
///
/// The barrier object is boxed so it never moves after `pthread_barrier_init`.
pub struct PthreadBarrier {
    inner: Box<UnsafeCell<libc::pthread_barrier_t>>,
    participants: usize,
}

// pthread barriers are designed to be shared between threads; all access goes through libc.
unsafe impl Send for PthreadBarrier {}
unsafe impl Sync for PthreadBarrier {}

impl PthreadBarrier {
    pub fn new(participants: usize) -> Result<Self, BarrierError> {
        if participants == 0 {
            return Err(BarrierError::InvalidArgument);
        }
        let count =
            libc::c_uint::try_from(participants).map_err(|_| BarrierError::InvalidArgument)?;
        let inner = Box::new(UnsafeCell::new(unsafe {
            mem::zeroed::<libc::pthread_barrier_t>()
        }));
        let ret = unsafe { libc::pthread_barrier_init(inner.get(), ptr::null(), count) };
        if ret != 0 {
            return Err(io::Error::from_raw_os_error(ret).into());
        }
        Ok(Self {
            inner,
            participants,
        })
    }
}

impl Rendezvous for PthreadBarrier {
    fn wait(&self) -> Result<BarrierWaitResult, BarrierError> {
        let ret = unsafe { libc::pthread_barrier_wait(self.inner.get()) };
        match ret {
            libc::PTHREAD_BARRIER_SERIAL_THREAD => Ok(BarrierWaitResult::leader()),
            0 => Ok(BarrierWaitResult::follower()),
            // the other party may or may not have been released, so no trial can rely on it
            err => {
                let err = io::Error::from_raw_os_error(err);
                error!("pthread_barrier_wait failed: {}", err);
                Err(BarrierError::Wait(err))
            }
        }
    }

    fn participants(&self) -> usize {
        self.participants
    }
}

impl Drop for PthreadBarrier {
    fn drop(&mut self) {
        let ret = unsafe { libc::pthread_barrier_destroy(self.inner.get()) };
        if ret != 0 {
            warn!(
                "pthread_barrier_destroy failed: {}",
                io::Error::from_raw_os_error(ret)
            );
        }
    }
}
