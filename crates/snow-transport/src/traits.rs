use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snow_types::{ChangeSet, EntityKind, EntityPayload, ReactionEmoji, Snowflake, UserPayload};

use crate::error::TransportResult;

/// Upper bound the remote service accepts for one reactor page.
pub const MAX_REACTORS_PER_PAGE: u8 = 100;

/// Which users reacted to a message with a given emoji.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorQuery {
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub emoji: ReactionEmoji,
    /// Page size, clamped to [`MAX_REACTORS_PER_PAGE`].
    pub limit: u8,
    /// Only users with a larger identity.
    pub after: Option<Snowflake>,
}

impl ReactorQuery {
    pub fn new(channel_id: Snowflake, message_id: Snowflake, emoji: ReactionEmoji, limit: u8) -> Self {
        Self {
            channel_id,
            message_id,
            emoji,
            limit: limit.min(MAX_REACTORS_PER_PAGE),
            after: None,
        }
    }
}

/// Remote access used by the cache.
///
/// All implementations must be thread-safe; the cache calls them from many
/// tasks at once and never holds an entity lock across an await on them.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the current snapshot of one entity.
    ///
    /// Returns `Ok(None)` if the remote service reports the identity does not
    /// exist. Other failures are errors the caller may retry.
    async fn fetch(&self, kind: EntityKind, id: Snowflake) -> TransportResult<Option<EntityPayload>>;

    /// Send one change set and return the remote-authoritative state of the
    /// target entity. The response may omit fields that did not change.
    async fn commit(&self, change_set: &ChangeSet) -> TransportResult<EntityPayload>;

    /// Fetch one page of users who reacted with `query.emoji`.
    async fn fetch_reactors(&self, query: &ReactorQuery) -> TransportResult<Vec<UserPayload>>;
}
