use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use snow_cache::Cached;
use snow_types::{EntityKind, MessagePayload, ReactionEvent, Snowflake};
use tracing::debug;

use crate::container::ReactionContainer;
use crate::error::{ReactionError, ReactionResult};

/// A cached message. Only its placement and reactions are tracked.
pub struct Message {
    id: Snowflake,
    channel_id: Snowflake,
    guild_id: Option<Snowflake>,
    reactions: ReactionContainer,
    deleted: AtomicBool,
}

impl Message {
    pub fn new(id: Snowflake, channel_id: Snowflake, guild_id: Option<Snowflake>, self_id: Option<Snowflake>) -> Self {
        Self {
            id,
            channel_id,
            guild_id,
            reactions: ReactionContainer::new(self_id),
            deleted: AtomicBool::new(false),
        }
    }

    /// A message shell placed where `payload` says. Reactions are not read.
    pub fn shell(payload: &MessagePayload, self_id: Option<Snowflake>) -> Self {
        Self::new(payload.id, payload.channel_id, payload.guild_id.present().copied(), self_id)
    }

    pub fn id(&self) -> Snowflake {
        self.id
    }

    pub fn channel_id(&self) -> Snowflake {
        self.channel_id
    }

    pub fn guild_id(&self) -> Option<Snowflake> {
        self.guild_id
    }

    pub fn reactions(&self) -> &ReactionContainer {
        &self.reactions
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn mark_deleted(&self, deleted: bool) -> bool {
        self.deleted.swap(deleted, Ordering::AcqRel)
    }

    /// Take the raw reaction counters from a message snapshot.
    pub fn merge(&self, payload: MessagePayload) -> ReactionResult<bool> {
        self.check(payload.id)?;
        let changed = self.reactions.replace_raw(payload.reactions);
        if changed {
            debug!(message = %self.id, "reaction counters updated");
        }
        Ok(changed)
    }

    pub fn apply_event(&self, event: &ReactionEvent) -> ReactionResult<bool> {
        self.check(event.message_id())?;
        self.reactions.apply_event(event)
    }

    fn check(&self, found: Snowflake) -> ReactionResult<()> {
        if found != self.id {
            return Err(ReactionError::WrongMessage {
                expected: self.id,
                found,
            });
        }
        Ok(())
    }
}

impl Cached for Message {
    const KIND: EntityKind = EntityKind::Message;

    fn id(&self) -> Snowflake {
        self.id
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("channel_id", &self.channel_id)
            .field("reactions", &self.reactions.snapshot())
            .finish()
    }
}
