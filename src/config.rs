use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    affinity::available_core_count,
    sync::BarrierKind,
    util::{DEFAULT_ITERATIONS_PER_TRIAL, DEFAULT_TRIALS_PER_PAIR},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("trials_per_pair must be at least 1")]
    ZeroTrials,
    #[error("iterations_per_trial must be at least 1")]
    ZeroIterations,
}

/// Parameters of a core-to-core sweep.
///
/// Missing fields in a JSON config fall back to the defaults: every core the process may run
/// on, 3000 trials per pair, 1000 handoffs per trial, the condvar barrier and pinning on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Cores `0..core_count` are swept.
    pub core_count: usize,
    pub trials_per_pair: usize,
    pub iterations_per_trial: usize,
    pub barrier: BarrierKind,
    /// Pin workers to their cores. Without pinning the numbers are mostly meaningless, but
    /// the sweep still runs.
    pub pin: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            core_count: available_core_count(),
            trials_per_pair: DEFAULT_TRIALS_PER_PAIR,
            iterations_per_trial: DEFAULT_ITERATIONS_PER_TRIAL,
            barrier: BarrierKind::default(),
            pin: true,
        }
    }
}

impl SweepConfig {
    pub fn from_jsonfile(filepath: &str) -> Result<SweepConfig> {
        let mut file = File::open(Path::new(filepath))
            .with_context(|| format!("failed to open config {}", filepath))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: SweepConfig = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", filepath))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials_per_pair == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        if self.iterations_per_trial == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        Ok(())
    }

    /// Ordered pairs of distinct cores.
    pub fn pair_count(&self) -> usize {
        self.core_count * self.core_count.saturating_sub(1)
    }

    pub fn trial_count(&self) -> usize {
        self.pair_count() * self.trials_per_pair
    }
}
