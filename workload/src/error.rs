use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("Malformed workload {path}: {source}")]
    MalformedWorkload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown operation code {opcode:?} on line {line}")]
    UnknownOperationCode { line: usize, opcode: String },

    #[error("Missing argument for {opcode} on line {line}")]
    MissingArgument { line: usize, opcode: char },
}
