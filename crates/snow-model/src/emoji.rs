use serde_json::{json, Value};
use snow_merge::{merge_option, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{EmojiPayload, EntityKind, EntityPayload, Permissions, Snowflake};

use crate::entity::{Entity, EntityState};

pub type Emoji = Entity<EmojiState>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmojiState {
    pub guild_id: Option<Snowflake>,
    pub name: String,
    /// Roles allowed to use the emoji; empty means everyone.
    pub roles: Vec<Snowflake>,
    pub animated: bool,
    pub managed: bool,
    pub require_colons: bool,
    pub available: bool,
}

impl Merge<EmojiPayload> for EmojiState {
    fn merge(&mut self, p: EmojiPayload, mode: MergeMode, report: &mut MergeReport) {
        merge_option("guild_id", &mut self.guild_id, p.guild_id, mode, report);
        merge_value("name", &mut self.name, p.name, mode, report);
        merge_value("roles", &mut self.roles, p.roles, mode, report);
        merge_value("animated", &mut self.animated, p.animated, mode, report);
        merge_value("managed", &mut self.managed, p.managed, mode, report);
        merge_value("require_colons", &mut self.require_colons, p.require_colons, mode, report);
        merge_value("available", &mut self.available, p.available, mode, report);
    }
}

impl EntityState for EmojiState {
    const KIND: EntityKind = EntityKind::Emoji;
    type Payload = EmojiPayload;

    fn payload(payload: EntityPayload) -> Result<EmojiPayload, EntityPayload> {
        match payload {
            EntityPayload::Emoji(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "guild_id" => json!(self.guild_id),
            "name" => json!(self.name),
            "roles" => json!(self.roles),
            "animated" => json!(self.animated),
            "managed" => json!(self.managed),
            "require_colons" => json!(self.require_colons),
            "available" => json!(self.available),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        !matches!(field, "name" | "roles")
    }

    fn required_permissions(&self, _id: Snowflake, _field: &str, _actor: Option<Snowflake>) -> Permissions {
        Permissions::MANAGE_EMOJIS
    }

    fn owner_guild(&self, _id: Snowflake) -> Option<Snowflake> {
        self.guild_id
    }
}
