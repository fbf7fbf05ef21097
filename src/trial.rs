//! One trial: a Flipper and a Timer thread measuring a single core pair.
use std::{fmt, io, thread};

use thiserror::Error;

use crate::{
    affinity::{bind_current_thread_to_core, CoreBinder},
    clock::MonotonicClock,
    handoff::{Flipper, SharedFlag, Timer, TimerOutcome},
    sync::{BarrierError, Rendezvous},
    util::TRIAL_PARTICIPANTS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRole {
    Flipper,
    Timer,
}

impl fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerRole::Flipper => write!(f, "flipper"),
            WorkerRole::Timer => write!(f, "timer"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TrialError {
    #[error("could not spawn the {role} thread: {source}")]
    ResourceExhausted {
        role: WorkerRole,
        #[source]
        source: io::Error,
    },
    #[error("the {role} thread panicked")]
    WorkerPanicked { role: WorkerRole },
    #[error("trial barrier must have {expected} participants, got {actual}")]
    BarrierParticipants { expected: usize, actual: usize },
    #[error("trial barrier failed: {0}")]
    Barrier(#[from] BarrierError),
}

/// The cores a trial's Flipper and Timer are pinned to. The two never coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorePairAssignment {
    flipper: usize,
    timer: usize,
}

impl CorePairAssignment {
    /// Returns `None` for `flipper == timer`.
    pub fn new(flipper: usize, timer: usize) -> Option<Self> {
        (flipper != timer).then_some(Self { flipper, timer })
    }
    pub fn flipper(&self) -> usize {
        self.flipper
    }
    pub fn timer(&self) -> usize {
        self.timer
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialResult {
    /// One-way latency estimate in nanoseconds.
    pub latency_ns: f64,
    pub flipper_handoffs: usize,
    pub timer_handoffs: usize,
}

/// Everything both workers of a trial share. Built by the sweep, borrowed by the workers.
pub struct TrialContext<'a> {
    pub flag: &'a SharedFlag,
    pub barrier: &'a dyn Rendezvous,
    pub clock: &'a dyn MonotonicClock,
    pub binder: &'a dyn CoreBinder,
    pub assignment: CorePairAssignment,
    pub iterations: usize,
}

fn spawn_worker<'scope, 'env, T, F>(
    s: &'scope thread::Scope<'scope, 'env>,
    role: WorkerRole,
    core: usize,
    f: F,
) -> Result<thread::ScopedJoinHandle<'scope, T>, TrialError>
where
    F: FnOnce() -> T + Send + 'scope,
    T: Send + 'scope,
{
    #[cfg(test)]
    {
        if tests::spawn_fails_for(role) {
            return Err(TrialError::ResourceExhausted {
                role,
                source: io::Error::from(io::ErrorKind::OutOfMemory),
            });
        }
    }
    thread::Builder::new()
        .name(format!("{}-{}", role, core))
        .spawn_scoped(s, f)
        .map_err(|source| TrialError::ResourceExhausted { role, source })
}

impl TrialContext<'_> {
    /// Run one trial and join both workers before returning.
    pub fn run(&self) -> Result<TrialResult, TrialError> {
        let participants = self.barrier.participants();
        if participants != TRIAL_PARTICIPANTS {
            return Err(TrialError::BarrierParticipants {
                expected: TRIAL_PARTICIPANTS,
                actual: participants,
            });
        }
        self.flag.reset();

        let ctx = self;
        thread::scope(|s| {
            let flipper = spawn_worker(s, WorkerRole::Flipper, ctx.assignment.flipper, move || {
                ctx.run_flipper()
            })?;
            let timer = spawn_worker(s, WorkerRole::Timer, ctx.assignment.timer, move || {
                ctx.run_timer()
            });
            let timer = match timer {
                Ok(timer) => timer,
                Err(err) => {
                    // The flipper is already waiting at the barrier. Stand in for the timer
                    // so it can finish and be joined, then drop the measurement.
                    warn!("{}, draining the flipper", err);
                    if ctx.barrier.wait().is_ok() {
                        Timer::new(ctx.flag, ctx.clock).run(ctx.iterations);
                    }
                    if flipper.join().is_err() {
                        return Err(TrialError::WorkerPanicked {
                            role: WorkerRole::Flipper,
                        });
                    }
                    return Err(err);
                }
            };

            let flipper = flipper.join();
            let timer = timer.join();
            let flipper_handoffs = flipper.map_err(|_| TrialError::WorkerPanicked {
                role: WorkerRole::Flipper,
            })??;
            let outcome = timer.map_err(|_| TrialError::WorkerPanicked {
                role: WorkerRole::Timer,
            })??;
            Ok(TrialResult {
                latency_ns: outcome.latency_ns(),
                flipper_handoffs,
                timer_handoffs: outcome.handoffs,
            })
        })
    }

    fn run_flipper(&self) -> Result<usize, BarrierError> {
        bind_current_thread_to_core(self.binder, self.assignment.flipper);
        self.barrier.wait()?;
        Ok(Flipper::new(self.flag).run(self.iterations))
    }

    fn run_timer(&self) -> Result<TimerOutcome, BarrierError> {
        bind_current_thread_to_core(self.binder, self.assignment.timer);
        // the clock must not start before the flipper is alive
        self.barrier.wait()?;
        Ok(Timer::new(self.flag, self.clock).run(self.iterations))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, io, sync::Mutex};

    use super::{CorePairAssignment, TrialContext, TrialError, WorkerRole};
    use crate::{
        affinity::{construct_core_binder, AffinityError, CoreBinder, NoAffinity},
        clock::InstantClock,
        handoff::{tests::StepClock, SharedFlag},
        sync::{
            construct_barrier, BarrierError, BarrierKind, BarrierWaitResult, CondvarBarrier,
            Rendezvous,
        },
    };

    thread_local! {
        static FAILING_SPAWN: Cell<Option<WorkerRole>> = const { Cell::new(None) };
    }

    /// Whether spawning `role` is set up to fail on the calling thread.
    pub(super) fn spawn_fails_for(role: WorkerRole) -> bool {
        FAILING_SPAWN.with(|f| f.get() == Some(role))
    }

    fn fail_spawn_of(role: Option<WorkerRole>) {
        FAILING_SPAWN.with(|f| f.set(role));
    }

    /// Lets every caller through at once.
    struct OpenBarrier;

    impl Rendezvous for OpenBarrier {
        fn wait(&self) -> Result<BarrierWaitResult, BarrierError> {
            Ok(BarrierWaitResult::leader())
        }
        fn participants(&self) -> usize {
            2
        }
    }

    struct BrokenBarrier;

    impl Rendezvous for BrokenBarrier {
        fn wait(&self) -> Result<BarrierWaitResult, BarrierError> {
            Err(BarrierError::Wait(io::Error::from(io::ErrorKind::InvalidInput)))
        }
        fn participants(&self) -> usize {
            2
        }
    }

    /// Records every core it is asked to pin to, never pins, and panics for `panic_on`.
    #[derive(Default)]
    struct RecordingBinder {
        panic_on: Option<usize>,
        cores: Mutex<Vec<usize>>,
    }

    impl CoreBinder for RecordingBinder {
        fn bind_current_thread(&self, core: usize) -> Result<(), AffinityError> {
            if self.panic_on == Some(core) {
                panic!("pinning to core {} blew up", core);
            }
            self.cores.lock().expect("poisoned").push(core);
            Err(AffinityError::Unsupported)
        }
    }

    fn context<'a>(
        flag: &'a SharedFlag,
        barrier: &'a dyn Rendezvous,
        clock: &'a InstantClock,
        binder: &'a dyn CoreBinder,
        iterations: usize,
    ) -> TrialContext<'a> {
        TrialContext {
            flag,
            barrier,
            clock,
            binder,
            assignment: CorePairAssignment::new(0, 1).expect("distinct cores"),
            iterations,
        }
    }

    #[test]
    fn test_timer_spawn_failure_drains_flipper() -> anyhow::Result<()> {
        let flag = SharedFlag::new();
        let barrier = CondvarBarrier::new(2)?;
        let clock = InstantClock::new();
        let binder = RecordingBinder::default();
        let ctx = context(&flag, &barrier, &clock, &binder, 10);

        fail_spawn_of(Some(WorkerRole::Timer));
        let result = ctx.run();
        fail_spawn_of(None);

        assert!(matches!(
            result,
            Err(TrialError::ResourceExhausted {
                role: WorkerRole::Timer,
                ..
            })
        ));
        // only the flipper started, and it got to finish all its handoffs
        assert_eq!(*binder.cores.lock().expect("poisoned"), vec![0]);
        assert!(flag.is_raised());

        // the barrier is back in its initial state
        let result = ctx.run()?;
        assert_eq!(result.flipper_handoffs, 10);
        assert_eq!(result.timer_handoffs, 10);
        Ok(())
    }

    #[test]
    fn test_flipper_spawn_failure() -> anyhow::Result<()> {
        let flag = SharedFlag::new();
        let barrier = CondvarBarrier::new(2)?;
        let clock = InstantClock::new();
        let binder = RecordingBinder::default();
        let ctx = context(&flag, &barrier, &clock, &binder, 10);

        fail_spawn_of(Some(WorkerRole::Flipper));
        let result = ctx.run();
        fail_spawn_of(None);

        assert!(matches!(
            result,
            Err(TrialError::ResourceExhausted {
                role: WorkerRole::Flipper,
                ..
            })
        ));
        assert!(binder.cores.lock().expect("poisoned").is_empty());
        Ok(())
    }

    #[test]
    fn test_flipper_panic_while_draining() {
        let flag = SharedFlag::new();
        let clock = InstantClock::new();
        let binder = RecordingBinder {
            panic_on: Some(0),
            ..Default::default()
        };
        let ctx = context(&flag, &OpenBarrier, &clock, &binder, 0);

        fail_spawn_of(Some(WorkerRole::Timer));
        let result = ctx.run();
        fail_spawn_of(None);

        assert!(matches!(
            result,
            Err(TrialError::WorkerPanicked {
                role: WorkerRole::Flipper
            })
        ));
    }

    #[test]
    fn test_worker_panics() {
        let flag = SharedFlag::new();
        let clock = InstantClock::new();
        for (core, role) in [(0, WorkerRole::Flipper), (1, WorkerRole::Timer)] {
            let binder = RecordingBinder {
                panic_on: Some(core),
                ..Default::default()
            };
            let ctx = context(&flag, &OpenBarrier, &clock, &binder, 0);
            match ctx.run() {
                Err(TrialError::WorkerPanicked { role: panicked }) => assert_eq!(panicked, role),
                other => panic!("expected a {} panic, got {:?}", role, other),
            }
        }
    }

    #[test]
    fn test_barrier_failure_is_fatal() {
        let flag = SharedFlag::new();
        let clock = InstantClock::new();
        let ctx = context(&flag, &BrokenBarrier, &clock, &NoAffinity, 10);
        assert!(matches!(ctx.run(), Err(TrialError::Barrier(BarrierError::Wait(_)))));
    }

    #[test]
    fn test_assignment_rejects_same_core() {
        assert!(CorePairAssignment::new(3, 3).is_none());
        let pair = CorePairAssignment::new(0, 1).expect("distinct cores");
        assert_eq!((pair.flipper(), pair.timer()), (0, 1));
    }

    #[test]
    fn test_trial_with_stepping_clock() -> anyhow::Result<()> {
        const STEP: u64 = 6_000;
        const ITERATIONS: usize = 30;
        let flag = SharedFlag::new();
        let barrier = CondvarBarrier::new(2)?;
        let clock = StepClock::new(STEP);
        let ctx = TrialContext {
            flag: &flag,
            barrier: &barrier,
            clock: &clock,
            binder: &NoAffinity,
            assignment: CorePairAssignment::new(0, 1).expect("distinct cores"),
            iterations: ITERATIONS,
        };
        let result = ctx.run()?;
        assert_eq!(result.latency_ns, STEP as f64 / ITERATIONS as f64 / 2.0);
        assert_eq!(result.flipper_handoffs, ITERATIONS);
        assert_eq!(result.timer_handoffs, ITERATIONS);
        Ok(())
    }

    #[test]
    fn test_shared_state_survives_many_trials() -> anyhow::Result<()> {
        const ITERATIONS: usize = 20;
        let flag = SharedFlag::new();
        let clock = InstantClock::new();
        let binder = construct_core_binder(true);
        for kind in [BarrierKind::Condvar, BarrierKind::Pthread] {
            let barrier = match construct_barrier(kind, 2) {
                Ok(barrier) => barrier,
                Err(_) => continue,
            };
            let ctx = TrialContext {
                flag: &flag,
                barrier: barrier.as_ref(),
                clock: &clock,
                binder: binder.as_ref(),
                assignment: CorePairAssignment::new(1, 0).expect("distinct cores"),
                iterations: ITERATIONS,
            };
            for _ in 0..50 {
                let result = ctx.run()?;
                assert_eq!(result.flipper_handoffs, ITERATIONS);
                assert_eq!(result.timer_handoffs, ITERATIONS);
                assert!(result.latency_ns.is_finite());
                assert!(result.latency_ns >= 0.0);
                assert!(flag.is_raised());
            }
        }
        Ok(())
    }

    #[test]
    fn test_trial_resets_flag() -> anyhow::Result<()> {
        let flag = SharedFlag::new();
        let barrier = CondvarBarrier::new(2)?;
        let clock = InstantClock::new();
        // leave the flag lowered, as an aborted run would
        crate::handoff::Flipper::new(&flag).run(1);
        let ctx = TrialContext {
            flag: &flag,
            barrier: &barrier,
            clock: &clock,
            binder: &NoAffinity,
            assignment: CorePairAssignment::new(0, 1).expect("distinct cores"),
            iterations: 5,
        };
        assert_eq!(ctx.run()?.timer_handoffs, 5);
        Ok(())
    }

    #[test]
    fn test_wrong_barrier_size() -> anyhow::Result<()> {
        let flag = SharedFlag::new();
        let barrier = CondvarBarrier::new(3)?;
        let clock = InstantClock::new();
        let ctx = TrialContext {
            flag: &flag,
            barrier: &barrier,
            clock: &clock,
            binder: &NoAffinity,
            assignment: CorePairAssignment::new(0, 1).expect("distinct cores"),
            iterations: 1,
        };
        assert!(matches!(
            ctx.run(),
            Err(TrialError::BarrierParticipants {
                expected: 2,
                actual: 3
            })
        ));
        Ok(())
    }
}
