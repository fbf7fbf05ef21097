//! Core-to-core latency measurement.
//!
//! Two threads, pinned to a pair of logical cores, bounce a single atomic flag back and forth.
//! The time a fixed number of round trips takes, halved, estimates the one-way cost of moving
//! a cache line between the two cores. [`Sweep`] repeats this for every ordered pair of cores
//! and reports the mean per pair.
//!
//! # Modules
//!
//! - `sync`: the reusable barrier both workers meet at before a trial starts.
//! - `affinity`: best-effort pinning of a thread to a core.
//! - `handoff`: the shared flag and the Flipper and Timer roles.
//! - `trial`: one Flipper/Timer pair measuring one core pair once.
//! - `sweep`: the controller iterating pairs and trials.
//! - `output`: CSV lines and the JSON report.
pub mod affinity;
pub mod clock;
pub mod config;
pub mod handoff;
pub mod matrix;
pub mod output;
pub mod sweep;
pub mod sync;
pub mod trial;
pub mod util;

pub use self::config::SweepConfig;
pub use self::sweep::{LatencySink, Sweep, SweepError};

#[macro_use]
extern crate log;
