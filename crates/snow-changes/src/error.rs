use std::time::Duration;

use snow_transport::TransportError;
use snow_types::{EntityKind, Permissions, Snowflake};
use thiserror::Error;

/// Errors raised by staging and committing changes.
///
/// Everything except `Remote` and `Timeout` is raised synchronously by the
/// offending call, before any I/O.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChangeError {
    #[error("{kind} {id} does not exist")]
    NotFound { kind: EntityKind, id: Snowflake },

    #[error("guild {guild} is unavailable")]
    Unavailable { guild: Snowflake },

    #[error("{kind} {id} is deleted")]
    Deleted { kind: EntityKind, id: Snowflake },

    #[error("changing `{field}` requires {required:?}")]
    PermissionDenied { field: String, required: Permissions },

    /// The commit reached the remote service and failed there.
    #[error("commit failed: {0}")]
    Remote(#[from] TransportError),

    #[error("{kind} {id} already has changes in progress")]
    Locked { kind: EntityKind, id: Snowflake },

    #[error("field `{field}` is locked")]
    FieldLocked { field: String },

    #[error("{kind} has no field `{field}`")]
    UnknownField { kind: EntityKind, field: String },

    #[error("field `{field}` is read-only")]
    ReadOnly { field: String },

    #[error("field `{field}` cannot be written without beginning changes")]
    NotStaging { field: String },

    #[error("`{collection}` has no child {id}")]
    UnknownChild { collection: String, id: Snowflake },

    #[error("commit timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("expected a {expected} payload, got {found}")]
    WrongKind { expected: EntityKind, found: EntityKind },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}

pub type ChangeResult<T> = Result<T, ChangeError>;
