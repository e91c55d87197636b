//! Replays recorded key-value workloads against a store and accounts for the
//! time (and optionally energy) each kind of operation costs.
//!
//! The [`Dispatcher`] drives one workload synchronously, timing every call
//! into a [`StatsTracker`]. [`run_experiments`] repeats the load and exec
//! phases over fresh stores, waits for background work between them and
//! merges the per-run results.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod experiment;
pub mod sampler;
pub mod settle;
pub mod stats;

pub use clock::{Clock, MonotonicClock};
pub use config::{EnergyMode, HarnessConfig, RangeScanPolicy, RangeTermination, SettlePolicy};
pub use dispatcher::{replay, Dispatcher};
pub use error::{ExperimentError, ReplayError};
pub use experiment::{run_experiments, ExperimentReport, PhaseReport, RunReport};
pub use sampler::{write_throughput_csv, ThroughputSample, ThroughputSampler, ThroughputSeries};
pub use settle::settle;
pub use stats::{CostBucket, StatsTracker};
