use snow_types::{ChangeSetId, EntityKind, ReactionEmoji, Snowflake};

/// Published on the client's broadcast channel after each cache change.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheEvent {
    Upserted {
        kind: EntityKind,
        id: Snowflake,
        guild_id: Option<Snowflake>,
        created: bool,
    },
    Deleted {
        kind: EntityKind,
        id: Snowflake,
    },
    /// A guild's channel views, voice membership or resolved pointers were
    /// recomputed.
    ViewsRebuilt {
        guild_id: Snowflake,
    },
    CommitApplied {
        kind: EntityKind,
        id: Snowflake,
        change_set: ChangeSetId,
    },
    ReactionsRepaired {
        message_id: Snowflake,
        emoji: ReactionEmoji,
        count: u32,
    },
}
