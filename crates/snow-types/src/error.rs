use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid snowflake: {0}")]
    InvalidSnowflake(String),

    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
