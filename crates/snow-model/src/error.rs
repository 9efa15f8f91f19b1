use snow_types::{EntityKind, Snowflake};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A guild-owned payload arrived without a guild to attach it to.
    #[error("{kind} {id} has no guild")]
    MissingGuild { kind: EntityKind, id: Snowflake },

    /// The registry does not hold entities of this kind.
    #[error("{0} payloads are not handled by the registry")]
    Unsupported(EntityKind),
}

pub type ModelResult<T> = Result<T, ModelError>;
