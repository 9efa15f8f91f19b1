use std::time::Duration;

use snow_types::{EntityKind, Snowflake};

/// Errors from identity cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The entity does not exist upstream.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Snowflake },

    /// A transient failure while fetching; the caller may retry.
    #[error("remote error: {0}")]
    Remote(String),

    /// The fetch did not resolve in time.
    #[error("download of {kind} {id} timed out after {after:?}")]
    Timeout {
        kind: EntityKind,
        id: Snowflake,
        after: Duration,
    },

    /// The fetcher produced an entity under a different identity.
    #[error("identity mismatch: requested {requested}, fetched {fetched}")]
    IdentityMismatch {
        requested: Snowflake,
        fetched: Snowflake,
    },
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
