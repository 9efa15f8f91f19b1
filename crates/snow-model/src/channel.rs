use serde_json::{json, Value};
use snow_graph::{ChannelLayout, ChannelNode};
use snow_merge::{merge_option, merge_validated, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{ChannelKind, ChannelPayload, EntityKind, EntityPayload, Permissions, Snowflake};

use crate::entity::{Entity, EntityState};

pub type Channel = Entity<ChannelState>;

/// Highest user limit a voice channel accepts; 0 means unlimited.
const MAX_USER_LIMIT: u32 = 99;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelState {
    pub guild_id: Option<Snowflake>,
    pub kind: ChannelKind,
    pub name: String,
    pub position: i32,
    /// Weak reference to the category, resolved through the guild.
    pub parent_id: Option<Snowflake>,
    pub topic: Option<String>,
    pub nsfw: bool,
    pub bitrate: u32,
    pub user_limit: u32,
}

impl Merge<ChannelPayload> for ChannelState {
    fn merge(&mut self, p: ChannelPayload, mode: MergeMode, report: &mut MergeReport) {
        merge_option("guild_id", &mut self.guild_id, p.guild_id, mode, report);
        merge_value("type", &mut self.kind, p.kind, mode, report);
        merge_value("name", &mut self.name, p.name, mode, report);
        merge_value("position", &mut self.position, p.position, mode, report);
        merge_option("parent_id", &mut self.parent_id, p.parent_id, mode, report);
        merge_option("topic", &mut self.topic, p.topic, mode, report);
        merge_value("nsfw", &mut self.nsfw, p.nsfw, mode, report);
        merge_value("bitrate", &mut self.bitrate, p.bitrate, mode, report);
        merge_validated("user_limit", &mut self.user_limit, p.user_limit, mode, report, |limit| {
            if *limit <= MAX_USER_LIMIT {
                Ok(())
            } else {
                Err(format!("{limit} exceeds {MAX_USER_LIMIT}"))
            }
        });
    }
}

impl EntityState for ChannelState {
    const KIND: EntityKind = EntityKind::Channel;
    type Payload = ChannelPayload;

    fn payload(payload: EntityPayload) -> Result<ChannelPayload, EntityPayload> {
        match payload {
            EntityPayload::Channel(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "guild_id" => json!(self.guild_id),
            "type" => json!(self.kind),
            "name" => json!(self.name),
            "position" => json!(self.position),
            "parent_id" => json!(self.parent_id),
            "topic" => json!(self.topic),
            "nsfw" => json!(self.nsfw),
            "bitrate" => json!(self.bitrate),
            "user_limit" => json!(self.user_limit),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        matches!(field, "guild_id" | "type")
    }

    fn required_permissions(&self, _id: Snowflake, _field: &str, _actor: Option<Snowflake>) -> Permissions {
        Permissions::MANAGE_CHANNELS
    }

    fn owner_guild(&self, _id: Snowflake) -> Option<Snowflake> {
        self.guild_id
    }
}

impl ChannelNode for Channel {
    fn id(&self) -> Snowflake {
        Entity::id(self)
    }

    fn kind(&self) -> ChannelKind {
        self.snapshot().kind
    }

    fn parent_id(&self) -> Option<Snowflake> {
        self.snapshot().parent_id
    }

    fn position(&self) -> i32 {
        self.snapshot().position
    }

    fn layout(&self) -> ChannelLayout {
        let state = self.snapshot();
        ChannelLayout {
            id: Entity::id(self),
            kind: state.kind,
            parent_id: state.parent_id,
            position: state.position,
        }
    }
}
