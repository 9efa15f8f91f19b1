//! Typed snapshot payloads delivered by the decoder.
//!
//! Every field other than the identity is a [`FieldState`], so a payload can
//! describe a complete snapshot or an arbitrary partial patch. Whether a payload
//! is a full snapshot is decided by the caller at ingestion time, not by the
//! payload itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field::FieldState;
use crate::identity::Snowflake;
use crate::kind::{ChannelKind, EntityKind};
use crate::permissions::Permissions;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildPayload {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub name: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub icon: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub owner_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub afk_channel_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub afk_timeout: FieldState<u32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub system_channel_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub verification_level: FieldState<u8>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub member_count: FieldState<u32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub unavailable: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub channels: FieldState<Vec<ChannelPayload>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub roles: FieldState<Vec<RolePayload>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub members: FieldState<Vec<MemberPayload>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub emojis: FieldState<Vec<EmojiPayload>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub voice_states: FieldState<Vec<VoiceStatePayload>>,
}

impl GuildPayload {
    /// A payload carrying only the identity.
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// The placeholder sent while a guild is in an outage.
    pub fn unavailable(id: Snowflake) -> Self {
        Self {
            id,
            unavailable: FieldState::Present(true),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(rename = "type", default, skip_serializing_if = "FieldState::is_absent")]
    pub kind: FieldState<ChannelKind>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub name: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub position: FieldState<i32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub parent_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub topic: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub nsfw: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub bitrate: FieldState<u32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub user_limit: FieldState<u32>,
}

impl ChannelPayload {
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RolePayload {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub name: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub color: FieldState<u32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub hoist: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub position: FieldState<i32>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub permissions: FieldState<Permissions>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub managed: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub mentionable: FieldState<bool>,
}

impl RolePayload {
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub username: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub discriminator: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub avatar: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub bot: FieldState<bool>,
}

impl UserPayload {
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// A guild member. Its identity is the wrapped user's identity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemberPayload {
    pub user: UserPayload,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub nick: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub roles: FieldState<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub joined_at: FieldState<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub deaf: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub mute: FieldState<bool>,
}

impl MemberPayload {
    pub fn new(user_id: Snowflake) -> Self {
        Self {
            user: UserPayload::new(user_id),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EmojiPayload {
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub name: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub roles: FieldState<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub animated: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub managed: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub require_colons: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub available: FieldState<bool>,
}

impl EmojiPayload {
    pub fn new(id: Snowflake) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

/// A user's voice connection inside a guild. A null `channel_id` means the
/// user left voice.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceStatePayload {
    pub user_id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub channel_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub session_id: FieldState<String>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub deaf: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub mute: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub self_deaf: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub self_mute: FieldState<bool>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub suppress: FieldState<bool>,
}

impl VoiceStatePayload {
    pub fn new(user_id: Snowflake) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }
}

/// Emoji as referenced by a reaction: custom emoji carry an id, unicode emoji
/// only a name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEmoji {
    #[serde(default)]
    pub id: Option<Snowflake>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub animated: bool,
}

impl PartialEmoji {
    /// The reaction key this emoji maps to, if it identifies anything.
    pub fn key(&self) -> Option<ReactionEmoji> {
        match (&self.id, &self.name) {
            (Some(id), _) => Some(ReactionEmoji::Custom(*id)),
            (None, Some(name)) if !name.is_empty() => Some(ReactionEmoji::Unicode(name.clone())),
            _ => None,
        }
    }
}

/// Identity of an emoji within a message's reactions.
///
/// Custom emoji are keyed by id alone (names can change), unicode emoji by
/// their literal text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionEmoji {
    Custom(Snowflake),
    Unicode(String),
}

impl fmt::Display for ReactionEmoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(id) => write!(f, "custom:{id}"),
            Self::Unicode(name) => f.write_str(name),
        }
    }
}

/// Raw per-emoji counter as carried by message payloads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionCountPayload {
    pub emoji: PartialEmoji,
    pub count: u32,
    #[serde(default)]
    pub me: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub guild_id: FieldState<Snowflake>,
    #[serde(default, skip_serializing_if = "FieldState::is_absent")]
    pub reactions: FieldState<Vec<ReactionCountPayload>>,
}

/// Reaction stream events. These carry the participant identity that raw
/// counters lack, but are not guaranteed to arrive for every change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReactionEvent {
    Add {
        message_id: Snowflake,
        channel_id: Snowflake,
        user_id: Snowflake,
        emoji: PartialEmoji,
    },
    Remove {
        message_id: Snowflake,
        channel_id: Snowflake,
        user_id: Snowflake,
        emoji: PartialEmoji,
    },
    RemoveAll {
        message_id: Snowflake,
        channel_id: Snowflake,
    },
    RemoveEmoji {
        message_id: Snowflake,
        channel_id: Snowflake,
        emoji: PartialEmoji,
    },
}

impl ReactionEvent {
    pub fn message_id(&self) -> Snowflake {
        match self {
            Self::Add { message_id, .. }
            | Self::Remove { message_id, .. }
            | Self::RemoveAll { message_id, .. }
            | Self::RemoveEmoji { message_id, .. } => *message_id,
        }
    }

    pub fn channel_id(&self) -> Snowflake {
        match self {
            Self::Add { channel_id, .. }
            | Self::Remove { channel_id, .. }
            | Self::RemoveAll { channel_id, .. }
            | Self::RemoveEmoji { channel_id, .. } => *channel_id,
        }
    }
}

/// Any snapshot the decoder can hand to the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EntityPayload {
    Guild(GuildPayload),
    Channel(ChannelPayload),
    Role(RolePayload),
    Member(MemberPayload),
    User(UserPayload),
    Emoji(EmojiPayload),
    Message(MessagePayload),
    VoiceState(VoiceStatePayload),
}

impl EntityPayload {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Guild(_) => EntityKind::Guild,
            Self::Channel(_) => EntityKind::Channel,
            Self::Role(_) => EntityKind::Role,
            Self::Member(_) => EntityKind::Member,
            Self::User(_) => EntityKind::User,
            Self::Emoji(_) => EntityKind::Emoji,
            Self::Message(_) => EntityKind::Message,
            Self::VoiceState(_) => EntityKind::VoiceState,
        }
    }

    /// Identity of the described entity. Members and voice states are keyed
    /// by their user.
    pub fn id(&self) -> Snowflake {
        match self {
            Self::Guild(p) => p.id,
            Self::Channel(p) => p.id,
            Self::Role(p) => p.id,
            Self::Member(p) => p.user.id,
            Self::User(p) => p.id,
            Self::Emoji(p) => p.id,
            Self::Message(p) => p.id,
            Self::VoiceState(p) => p.user_id,
        }
    }
}
