pub const CL_SIZE: usize = 64;

/// Both roles of a trial meet at the barrier, nobody else.
pub const TRIAL_PARTICIPANTS: usize = 2;

pub const DEFAULT_TRIALS_PER_PAIR: usize = 3000;
pub const DEFAULT_ITERATIONS_PER_TRIAL: usize = 1000;

pub const NANOS_PER_SEC: f64 = 1_000_000_000.0;
