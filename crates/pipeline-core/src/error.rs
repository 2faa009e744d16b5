use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not initialized: run 'pipeline init'")]
    NotInitialized,

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("record already exists: {0}")]
    DuplicateKey(String),

    #[error("unable to {action}, {item} is in state {actual} (expected {expected})")]
    InvalidState {
        action: String,
        item: String,
        expected: String,
        actual: String,
    },

    #[error("unable to {action}, {item} has {field} '{actual}' but '{supplied}' was supplied")]
    CorrelationMismatch {
        action: String,
        item: String,
        field: String,
        actual: String,
        supplied: String,
    },

    #[error("cannot deserialize record: {0}")]
    Deserialization(String),

    #[error("cursor error: {0}")]
    Cursor(String),

    #[error("ledger store error: {0}")]
    Store(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
