use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Store error: {0}")]
    Other(String),
}
