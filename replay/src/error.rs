use energy::EnergyError;
use memtable::StoreError;
use thiserror::Error;
use workload::{OperationKind, WorkloadError};

use crate::experiment::ExperimentReport;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Store rejected {kind} #{seq}: {source}")]
    StoreOperationFailed {
        seq: u64,
        kind: OperationKind,
        #[source]
        source: StoreError,
    },

    #[error("Flush after replay failed: {0}")]
    FlushFailed(#[source] StoreError),

    #[error("Clock unavailable: {0}")]
    ClockUnavailable(#[source] std::io::Error),

    #[error("Background work did not settle after {attempts} polls")]
    SettleTimeout { attempts: u32 },

    #[error("Energy error: {0}")]
    Energy(#[from] EnergyError),

    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid throughput output: {0}")]
    InvalidThroughput(String),
}

/// A failed experiment, with everything recorded up to the failure.
#[derive(Debug, Error)]
#[error("Experiment aborted in run {run}: {source}")]
pub struct ExperimentError {
    pub run: u16,
    /// Every run started so far, the failed one last with its partial stats.
    pub report: Box<ExperimentReport>,
    #[source]
    pub source: ReplayError,
}
