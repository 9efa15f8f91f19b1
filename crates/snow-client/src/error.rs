use snow_types::{EntityKind, Snowflake};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Snowflake },

    /// The payload handed to ingestion describes a different entity than
    /// the one it was delivered for.
    #[error("payload for {found_kind} {found_id} delivered as {kind} {id}")]
    PayloadMismatch {
        kind: EntityKind,
        id: Snowflake,
        found_kind: EntityKind,
        found_id: Snowflake,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("change error: {0}")]
    Change(#[from] snow_changes::ChangeError),

    #[error("cache error: {0}")]
    Cache(#[from] snow_cache::CacheError),

    #[error("model error: {0}")]
    Model(#[from] snow_model::ModelError),

    #[error("reaction error: {0}")]
    Reaction(#[from] snow_reactions::ReactionError),
}

pub type ClientResult<T> = Result<T, ClientError>;
