use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The entity types held by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Guild,
    Channel,
    Role,
    Member,
    User,
    Emoji,
    Message,
    VoiceState,
}

impl EntityKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Member => "member",
            Self::User => "user",
            Self::Emoji => "emoji",
            Self::Message => "message",
            Self::VoiceState => "voice_state",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "guild" => Self::Guild,
            "channel" => Self::Channel,
            "role" => Self::Role,
            "member" => Self::Member,
            "user" => Self::User,
            "emoji" => Self::Emoji,
            "message" => Self::Message,
            "voice_state" => Self::VoiceState,
            other => return Err(TypeError::UnknownKind(other.to_string())),
        })
    }
}

/// Channel discriminant.
///
/// Decodes from the platform's integer discriminant. Values this crate does not
/// know about land in [`ChannelKind::Unknown`] rather than failing the payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelKind {
    Text,
    Direct,
    Voice,
    Group,
    Category,
    News,
    Stage,
    #[default]
    Unknown,
}

impl ChannelKind {
    /// Text-like channels accept messages.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text | Self::News)
    }

    /// Voice-like channels carry voice states.
    pub fn is_voice(&self) -> bool {
        matches!(self, Self::Voice | Self::Stage)
    }
}

impl From<u8> for ChannelKind {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Self::Text,
            1 => Self::Direct,
            2 => Self::Voice,
            3 => Self::Group,
            4 => Self::Category,
            5 => Self::News,
            13 => Self::Stage,
            _ => Self::Unknown,
        }
    }
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Text => 0,
            ChannelKind::Direct => 1,
            ChannelKind::Voice => 2,
            ChannelKind::Group => 3,
            ChannelKind::Category => 4,
            ChannelKind::News => 5,
            ChannelKind::Stage => 13,
            ChannelKind::Unknown => u8::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_roundtrip() {
        for kind in [
            EntityKind::Guild,
            EntityKind::Channel,
            EntityKind::Role,
            EntityKind::Member,
            EntityKind::User,
            EntityKind::Emoji,
            EntityKind::Message,
            EntityKind::VoiceState,
        ] {
            assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
        }
        assert!("webhook".parse::<EntityKind>().is_err());
    }

    #[test]
    fn unknown_discriminant_falls_back() {
        assert_eq!(ChannelKind::from(0), ChannelKind::Text);
        assert_eq!(ChannelKind::from(13), ChannelKind::Stage);
        assert_eq!(ChannelKind::from(99), ChannelKind::Unknown);
        let kind: ChannelKind = serde_json::from_str("15").unwrap();
        assert_eq!(kind, ChannelKind::Unknown);
    }

    #[test]
    fn buckets() {
        assert!(ChannelKind::News.is_text());
        assert!(ChannelKind::Stage.is_voice());
        assert!(!ChannelKind::Category.is_text());
        assert!(!ChannelKind::Unknown.is_voice());
    }
}
