use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use snow_merge::{merge_option, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{EntityKind, EntityPayload, MemberPayload, Permissions, Snowflake};

use crate::entity::{Entity, EntityState};

/// A user's membership in one guild. Its identity is the user's identity;
/// the guild keeps at most one member per user.
pub type Member = Entity<MemberState>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemberState {
    pub guild_id: Option<Snowflake>,
    pub nick: Option<String>,
    pub roles: Vec<Snowflake>,
    pub joined_at: Option<DateTime<Utc>>,
    pub deaf: bool,
    pub mute: bool,
}

/// The nested user object is merged into the user cache by the registry.
impl Merge<MemberPayload> for MemberState {
    fn merge(&mut self, p: MemberPayload, mode: MergeMode, report: &mut MergeReport) {
        merge_option("guild_id", &mut self.guild_id, p.guild_id, mode, report);
        merge_option("nick", &mut self.nick, p.nick, mode, report);
        merge_value("roles", &mut self.roles, p.roles, mode, report);
        merge_option("joined_at", &mut self.joined_at, p.joined_at, mode, report);
        merge_value("deaf", &mut self.deaf, p.deaf, mode, report);
        merge_value("mute", &mut self.mute, p.mute, mode, report);
    }
}

impl EntityState for MemberState {
    const KIND: EntityKind = EntityKind::Member;
    type Payload = MemberPayload;

    fn payload(payload: EntityPayload) -> Result<MemberPayload, EntityPayload> {
        match payload {
            EntityPayload::Member(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "guild_id" => json!(self.guild_id),
            "nick" => json!(self.nick),
            "roles" => json!(self.roles),
            "joined_at" => json!(self.joined_at),
            "deaf" => json!(self.deaf),
            "mute" => json!(self.mute),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        matches!(field, "guild_id" | "joined_at")
    }

    fn required_permissions(&self, id: Snowflake, field: &str, actor: Option<Snowflake>) -> Permissions {
        match field {
            "nick" if actor == Some(id) => Permissions::CHANGE_NICKNAME,
            "nick" => Permissions::MANAGE_NICKNAMES,
            "deaf" => Permissions::DEAFEN_MEMBERS,
            "mute" => Permissions::MUTE_MEMBERS,
            _ => Permissions::MANAGE_ROLES,
        }
    }

    fn owner_guild(&self, _id: Snowflake) -> Option<Snowflake> {
        self.guild_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_nickname_needs_change_nickname() {
        let state = MemberState::default();
        let me = Snowflake::new(5);
        assert_eq!(
            state.required_permissions(me, "nick", Some(me)),
            Permissions::CHANGE_NICKNAME
        );
        assert_eq!(
            state.required_permissions(me, "nick", Some(Snowflake::new(6))),
            Permissions::MANAGE_NICKNAMES
        );
        assert_eq!(state.required_permissions(me, "roles", Some(me)), Permissions::MANAGE_ROLES);
    }
}
