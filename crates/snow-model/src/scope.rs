use std::sync::Arc;

use snow_changes::Scope;
use snow_types::{Permissions, Snowflake};

use crate::guild::Guild;

/// Write context backed by the live guild entity.
///
/// Availability and permissions are read from the guild's current snapshot
/// on every check, so an outage or a role change that lands mid-session is
/// honored by the next staged write.
#[derive(Clone, Debug, Default)]
pub struct EntityScope {
    guild: Option<Arc<Guild>>,
    actor: Option<Snowflake>,
}

impl EntityScope {
    pub fn new(guild: Option<Arc<Guild>>, actor: Option<Snowflake>) -> Self {
        Self { guild, actor }
    }
}

impl Scope for EntityScope {
    fn unavailable_guild(&self) -> Option<Snowflake> {
        self.guild
            .as_ref()
            .filter(|guild| guild.snapshot().unavailable)
            .map(|guild| guild.id())
    }

    fn granted(&self) -> Option<Permissions> {
        let guild = self.guild.as_ref()?;
        let actor = self.actor?;
        Some(guild.permissions_for(actor))
    }

    fn actor(&self) -> Option<Snowflake> {
        self.actor
    }
}
