use serde_json::{json, Value};
use snow_merge::{merge_option, merge_validated, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{EntityKind, EntityPayload, Permissions, RolePayload, Snowflake};

use crate::entity::{Entity, EntityState};

pub type Role = Entity<RoleState>;

const MAX_COLOR: u32 = 0xFF_FFFF;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleState {
    pub guild_id: Option<Snowflake>,
    pub name: String,
    pub color: u32,
    pub hoist: bool,
    pub position: i32,
    pub permissions: Permissions,
    pub managed: bool,
    pub mentionable: bool,
}

impl Merge<RolePayload> for RoleState {
    fn merge(&mut self, p: RolePayload, mode: MergeMode, report: &mut MergeReport) {
        merge_option("guild_id", &mut self.guild_id, p.guild_id, mode, report);
        merge_value("name", &mut self.name, p.name, mode, report);
        merge_validated("color", &mut self.color, p.color, mode, report, |color| {
            if *color <= MAX_COLOR {
                Ok(())
            } else {
                Err(format!("{color:#x} is not an RGB color"))
            }
        });
        merge_value("hoist", &mut self.hoist, p.hoist, mode, report);
        merge_value("position", &mut self.position, p.position, mode, report);
        merge_value("permissions", &mut self.permissions, p.permissions, mode, report);
        merge_value("managed", &mut self.managed, p.managed, mode, report);
        merge_value("mentionable", &mut self.mentionable, p.mentionable, mode, report);
    }
}

impl EntityState for RoleState {
    const KIND: EntityKind = EntityKind::Role;
    type Payload = RolePayload;

    fn payload(payload: EntityPayload) -> Result<RolePayload, EntityPayload> {
        match payload {
            EntityPayload::Role(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "guild_id" => json!(self.guild_id),
            "name" => json!(self.name),
            "color" => json!(self.color),
            "hoist" => json!(self.hoist),
            "position" => json!(self.position),
            "permissions" => json!(self.permissions),
            "managed" => json!(self.managed),
            "mentionable" => json!(self.mentionable),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        matches!(field, "guild_id" | "managed")
    }

    fn required_permissions(&self, _id: Snowflake, _field: &str, _actor: Option<Snowflake>) -> Permissions {
        Permissions::MANAGE_ROLES
    }

    fn owner_guild(&self, _id: Snowflake) -> Option<Snowflake> {
        self.guild_id
    }
}

impl Role {
    /// Whether this is the guild's implicit `@everyone` role.
    pub fn is_everyone(&self) -> bool {
        self.snapshot().guild_id == Some(self.id())
    }
}
