use snow_transport::TransportError;
use snow_types::Snowflake;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactionError {
    /// The event's emoji carries neither an id nor a name.
    #[error("reaction emoji has no identity")]
    InvalidEmoji,

    /// An event was routed to a message it does not describe.
    #[error("event for message {found} applied to message {expected}")]
    WrongMessage { expected: Snowflake, found: Snowflake },

    #[error("transport error: {0}")]
    Remote(#[from] TransportError),
}

pub type ReactionResult<T> = Result<T, ReactionError>;
