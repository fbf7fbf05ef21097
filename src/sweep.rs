//! The sweep controller: every ordered pair of distinct cores, one trial at a time.
use std::io;

use indicatif::{MultiProgress, ProgressBar};
use itertools::Itertools;
use thiserror::Error;

use crate::{
    affinity::{construct_core_binder, CoreBinder},
    clock::{InstantClock, MonotonicClock},
    config::{ConfigError, SweepConfig},
    handoff::SharedFlag,
    matrix::{LatencyMatrix, MeanAccumulator, PairLatency},
    sync::{construct_barrier, BarrierError, Rendezvous},
    trial::{CorePairAssignment, TrialContext, TrialError},
    util::{NamedProgress, TRIAL_PARTICIPANTS},
};

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("invalid sweep configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to set up the trial barrier: {0}")]
    Barrier(#[from] BarrierError),
    #[error("trial {trial} of core pair ({first}, {second}) failed")]
    Trial {
        first: usize,
        second: usize,
        trial: usize,
        #[source]
        source: TrialError,
    },
    #[error("failed to emit the result of core pair ({first}, {second})")]
    Sink {
        first: usize,
        second: usize,
        #[source]
        source: io::Error,
    },
}

/// Receives the mean latency of each pair as soon as its trials are done.
pub trait LatencySink {
    fn record(&mut self, latency: &PairLatency) -> io::Result<()>;
}

impl<F: FnMut(&PairLatency) -> io::Result<()>> LatencySink for F {
    fn record(&mut self, latency: &PairLatency) -> io::Result<()> {
        self(latency)
    }
}

/// Owns the state reused by every trial: the flag, the barrier, the clock and the binder.
pub struct Sweep {
    config: SweepConfig,
    flag: SharedFlag,
    barrier: Box<dyn Rendezvous>,
    clock: Box<dyn MonotonicClock>,
    binder: Box<dyn CoreBinder>,
    progress: Option<MultiProgress>,
}

impl Sweep {
    pub fn new(config: SweepConfig, progress: Option<MultiProgress>) -> Result<Self, SweepError> {
        config.validate()?;
        let barrier = construct_barrier(config.barrier, TRIAL_PARTICIPANTS)?;
        let binder = construct_core_binder(config.pin);
        Ok(Self {
            config,
            flag: SharedFlag::new(),
            barrier,
            clock: Box::new(InstantClock::new()),
            binder,
            progress,
        })
    }

    /// Replace the clock the Timer reads.
    pub fn with_clock(mut self, clock: Box<dyn MonotonicClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_binder(mut self, binder: Box<dyn CoreBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Ordered pairs of distinct cores, outer index ascending, then inner index ascending.
    pub fn pairs(&self) -> impl Iterator<Item = CorePairAssignment> {
        let cores = 0..self.config.core_count;
        cores
            .clone()
            .cartesian_product(cores)
            .filter_map(|(first, second)| CorePairAssignment::new(first, second))
    }

    /// Run `trials_per_pair` trials back to back and return the mean latency.
    pub fn measure_pair(
        &self,
        assignment: CorePairAssignment,
        progress: Option<&ProgressBar>,
    ) -> Result<f64, SweepError> {
        let ctx = TrialContext {
            flag: &self.flag,
            barrier: self.barrier.as_ref(),
            clock: self.clock.as_ref(),
            binder: self.binder.as_ref(),
            assignment,
            iterations: self.config.iterations_per_trial,
        };
        let mut acc = MeanAccumulator::default();
        for trial in 0..self.config.trials_per_pair {
            let result = ctx.run().map_err(|source| SweepError::Trial {
                first: assignment.flipper(),
                second: assignment.timer(),
                trial,
                source,
            })?;
            trace!(
                "({}, {}) trial {}: {:.2} ns",
                assignment.flipper(),
                assignment.timer(),
                trial,
                result.latency_ns
            );
            acc.add(result.latency_ns);
            if let Some(p) = progress {
                p.inc(1);
            }
        }
        // validate() guarantees at least one trial
        Ok(acc.mean().unwrap_or_default())
    }

    /// Measure every pair and hand each mean to `sink` in sweep order.
    ///
    /// The first failing trial stops the sweep. Pairs already handed to `sink` stay emitted.
    pub fn run<S: LatencySink + ?Sized>(&self, sink: &mut S) -> Result<LatencyMatrix, SweepError> {
        let config = &self.config;
        if config.core_count < 2 {
            warn!(
                "Need at least two cores for a sweep, got {}. Nothing to measure.",
                config.core_count
            );
        }
        info!(
            "Sweeping {} core pairs, {} trials per pair, {} handoffs per trial",
            config.pair_count(),
            config.trials_per_pair,
            config.iterations_per_trial
        );

        let bar = self.progress.as_ref().map(|progress| {
            progress.add(ProgressBar::named_bar("Trials", config.trial_count() as u64))
        });

        let mut matrix = LatencyMatrix::new(config.core_count);
        for assignment in self.pairs() {
            let (first, second) = (assignment.flipper(), assignment.timer());
            if let Some(bar) = &bar {
                bar.set_message(format!("cores {} -> {}", first, second));
            }
            let mean_ns = self.measure_pair(assignment, bar.as_ref())?;
            info!("({}, {}) mean latency {:.2} ns", first, second, mean_ns);
            matrix.set(first, second, mean_ns);
            let latency = PairLatency {
                first,
                second,
                mean_ns,
            };
            sink.record(&latency).map_err(|source| SweepError::Sink {
                first,
                second,
                source,
            })?;
        }
        if let Some(bar) = bar {
            bar.finish();
        }
        info!("Sweep done");
        Ok(matrix)
    }
}
