use serde_json::{json, Value};
use snow_merge::{merge_option, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{EntityKind, EntityPayload, Permissions, Snowflake, UserPayload};

use crate::entity::{Entity, EntityState};

pub type User = Entity<UserState>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserState {
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<String>,
    pub bot: bool,
}

impl UserState {
    /// `name#discriminator`, or just the name for users without one.
    pub fn tag(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

impl Merge<UserPayload> for UserState {
    fn merge(&mut self, p: UserPayload, mode: MergeMode, report: &mut MergeReport) {
        merge_value("username", &mut self.username, p.username, mode, report);
        merge_value("discriminator", &mut self.discriminator, p.discriminator, mode, report);
        merge_option("avatar", &mut self.avatar, p.avatar, mode, report);
        merge_value("bot", &mut self.bot, p.bot, mode, report);
    }
}

impl EntityState for UserState {
    const KIND: EntityKind = EntityKind::User;
    type Payload = UserPayload;

    fn payload(payload: EntityPayload) -> Result<UserPayload, EntityPayload> {
        match payload {
            EntityPayload::User(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "username" => json!(self.username),
            "discriminator" => json!(self.discriminator),
            "avatar" => json!(self.avatar),
            "bot" => json!(self.bot),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        matches!(field, "discriminator" | "bot")
    }

    /// Users edit their own profile; there is no guild capability involved.
    fn required_permissions(&self, _id: Snowflake, _field: &str, _actor: Option<Snowflake>) -> Permissions {
        Permissions::empty()
    }

    fn owner_guild(&self, _id: Snowflake) -> Option<Snowflake> {
        None
    }
}
