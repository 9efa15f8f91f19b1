use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use snow_graph::{resolve, ChannelViews, VoiceMembership};
use snow_merge::{merge_option, merge_validated, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{ChangeSet, EntityKind, EntityPayload, GuildPayload, Permissions, Snowflake};
use tracing::trace;

use crate::channel::Channel;
use crate::emoji::Emoji;
use crate::entity::{merge_reply, Entity, EntityState};
use crate::member::Member;
use crate::role::Role;
use crate::voice::VoiceState;

pub type Guild = Entity<GuildState>;

const MAX_VERIFICATION_LEVEL: u8 = 4;

/// A guild snapshot: scalar fields, owned collections and the views derived
/// from them.
///
/// Owned collections and derived views are only changed by the registry and
/// the commit path; every change to a collection rebuilds the views in the
/// same snapshot.
#[derive(Clone, Debug, Default)]
pub struct GuildState {
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: Option<Snowflake>,
    pub afk_channel_id: Option<Snowflake>,
    pub afk_timeout: u32,
    pub system_channel_id: Option<Snowflake>,
    pub verification_level: u8,
    pub member_count: u32,
    /// The guild is in an outage; everything else is last-known data.
    pub unavailable: bool,

    pub(crate) channels: Vec<Arc<Channel>>,
    pub(crate) roles: Vec<Arc<Role>>,
    pub(crate) members: BTreeMap<Snowflake, Arc<Member>>,
    pub(crate) emojis: Vec<Arc<Emoji>>,
    pub(crate) voice_states: Vec<VoiceState>,

    views: ChannelViews<Channel>,
    voice: VoiceMembership,
    system_channel: Option<Arc<Channel>>,
    afk_channel: Option<Arc<Channel>>,
}

impl GuildState {
    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    pub fn roles(&self) -> &[Arc<Role>] {
        &self.roles
    }

    pub fn members(&self) -> impl Iterator<Item = &Arc<Member>> {
        self.members.values()
    }

    pub fn emojis(&self) -> &[Arc<Emoji>] {
        &self.emojis
    }

    pub fn voice_states(&self) -> &[VoiceState] {
        &self.voice_states
    }

    pub fn channel(&self, id: Snowflake) -> Option<&Arc<Channel>> {
        self.channels.iter().find(|c| c.id() == id)
    }

    pub fn role(&self, id: Snowflake) -> Option<&Arc<Role>> {
        self.roles.iter().find(|r| r.id() == id)
    }

    pub fn member(&self, user: Snowflake) -> Option<&Arc<Member>> {
        self.members.get(&user)
    }

    pub fn emoji(&self, id: Snowflake) -> Option<&Arc<Emoji>> {
        self.emojis.iter().find(|e| e.id() == id)
    }

    pub fn voice_state(&self, user: Snowflake) -> Option<&VoiceState> {
        self.voice_states.iter().find(|v| v.user_id == user)
    }

    /// Channel buckets and category links.
    pub fn views(&self) -> &ChannelViews<Channel> {
        &self.views
    }

    pub fn text_channels(&self) -> &[Arc<Channel>] {
        &self.views.text
    }

    pub fn voice_channels(&self) -> &[Arc<Channel>] {
        &self.views.voice
    }

    pub fn categories(&self) -> &[Arc<Channel>] {
        &self.views.categories
    }

    pub fn voice_membership(&self) -> &VoiceMembership {
        &self.voice
    }

    /// `system_channel_id` resolved against the current channel list.
    pub fn system_channel(&self) -> Option<&Arc<Channel>> {
        self.system_channel.as_ref()
    }

    /// `afk_channel_id` resolved against the current channel list.
    pub fn afk_channel(&self) -> Option<&Arc<Channel>> {
        self.afk_channel.as_ref()
    }

    /// Recompute every derived view from the owned collections. O(n log n)
    /// in the number of channels plus O(n) in voice states.
    pub(crate) fn rebuild(&mut self) {
        self.views = ChannelViews::build(&self.channels);
        self.voice = VoiceMembership::build(&self.voice_states);
        self.resolve_pointers();
        trace!(
            channels = self.channels.len(),
            connected = self.voice.connected(),
            "guild views rebuilt"
        );
    }

    fn resolve_pointers(&mut self) {
        self.system_channel = resolve(&self.channels, self.system_channel_id);
        self.afk_channel = resolve(&self.channels, self.afk_channel_id);
    }

    // -----------------------------------------------------------------------
    // Owned collection edits (registry and commit path)
    // -----------------------------------------------------------------------

    pub(crate) fn replace_channels(&mut self, next: Vec<Arc<Channel>>) -> Vec<Snowflake> {
        replace_owned(&mut self.channels, next)
    }

    pub(crate) fn replace_roles(&mut self, next: Vec<Arc<Role>>) -> Vec<Snowflake> {
        replace_owned(&mut self.roles, next)
    }

    pub(crate) fn replace_emojis(&mut self, next: Vec<Arc<Emoji>>) -> Vec<Snowflake> {
        replace_owned(&mut self.emojis, next)
    }

    pub(crate) fn replace_members(&mut self, next: BTreeMap<Snowflake, Arc<Member>>) -> Vec<Snowflake> {
        let dropped: Vec<Snowflake> = self
            .members
            .keys()
            .filter(|id| !next.contains_key(id))
            .copied()
            .collect();
        for id in &dropped {
            if let Some(member) = self.members.get(id) {
                member.mark_deleted(true);
            }
        }
        self.members = next;
        dropped
    }

    pub(crate) fn link_channel(&mut self, channel: &Arc<Channel>) {
        link_owned(&mut self.channels, channel);
    }

    pub(crate) fn link_role(&mut self, role: &Arc<Role>) {
        link_owned(&mut self.roles, role);
    }

    pub(crate) fn link_emoji(&mut self, emoji: &Arc<Emoji>) {
        link_owned(&mut self.emojis, emoji);
    }

    pub(crate) fn unlink_channel(&mut self, id: Snowflake) -> Option<Arc<Channel>> {
        unlink_owned(&mut self.channels, id)
    }

    pub(crate) fn unlink_role(&mut self, id: Snowflake) -> Option<Arc<Role>> {
        // Members drop the role too.
        for member in self.members.values() {
            if member.snapshot().roles.contains(&id) {
                member.mutate(|m| m.roles.retain(|r| *r != id));
            }
        }
        unlink_owned(&mut self.roles, id)
    }

    pub(crate) fn unlink_emoji(&mut self, id: Snowflake) -> Option<Arc<Emoji>> {
        unlink_owned(&mut self.emojis, id)
    }

    pub(crate) fn unlink_member(&mut self, id: Snowflake) -> Option<Arc<Member>> {
        self.members.remove(&id)
    }

    /// Insert or merge one voice state. A state without a channel means the
    /// user left voice and is dropped.
    pub(crate) fn upsert_voice_state(
        &mut self,
        payload: snow_types::VoiceStatePayload,
        mode: MergeMode,
        report: &mut MergeReport,
    ) {
        let user = payload.user_id;
        let index = match self.voice_states.iter().position(|v| v.user_id == user) {
            Some(index) => index,
            None => {
                self.voice_states.push(VoiceState::new(user));
                self.voice_states.len() - 1
            }
        };
        self.voice_states[index].merge(payload, mode, report);
        if !self.voice_states[index].is_connected() {
            self.voice_states.remove(index);
        }
    }

    pub(crate) fn remove_voice_state(&mut self, user: Snowflake) -> bool {
        let before = self.voice_states.len();
        self.voice_states.retain(|v| v.user_id != user);
        self.voice_states.len() != before
    }

    pub(crate) fn set_voice_states(&mut self, states: Vec<VoiceState>) {
        self.voice_states = states.into_iter().filter(VoiceState::is_connected).collect();
    }
}

/// Swap an owned list for `next`, marking children that did not survive as
/// deleted. Returns the dropped identities.
fn replace_owned<S: EntityState>(current: &mut Vec<Arc<Entity<S>>>, next: Vec<Arc<Entity<S>>>) -> Vec<Snowflake> {
    let mut dropped = Vec::new();
    for child in current.iter() {
        if !next.iter().any(|n| Arc::ptr_eq(n, child)) {
            child.mark_deleted(true);
            dropped.push(child.id());
        }
    }
    *current = next;
    dropped
}

fn link_owned<S: EntityState>(current: &mut Vec<Arc<Entity<S>>>, child: &Arc<Entity<S>>) {
    match current.iter_mut().find(|c| c.id() == child.id()) {
        Some(slot) => *slot = Arc::clone(child),
        None => current.push(Arc::clone(child)),
    }
}

fn unlink_owned<S: EntityState>(current: &mut Vec<Arc<Entity<S>>>, id: Snowflake) -> Option<Arc<Entity<S>>> {
    let index = current.iter().position(|c| c.id() == id)?;
    Some(current.remove(index))
}

fn ids<S: EntityState>(children: &[Arc<Entity<S>>]) -> Value {
    json!(children.iter().map(|c| c.id()).collect::<Vec<_>>())
}

/// Scalars only. Owned collections are taken out of the payload and applied
/// by the registry, which has to resolve the children against its caches.
impl Merge<GuildPayload> for GuildState {
    fn merge(&mut self, p: GuildPayload, mode: MergeMode, report: &mut MergeReport) {
        merge_value("name", &mut self.name, p.name, mode, report);
        merge_option("icon", &mut self.icon, p.icon, mode, report);
        merge_option("owner_id", &mut self.owner_id, p.owner_id, mode, report);
        merge_option("afk_channel_id", &mut self.afk_channel_id, p.afk_channel_id, mode, report);
        merge_value("afk_timeout", &mut self.afk_timeout, p.afk_timeout, mode, report);
        merge_option("system_channel_id", &mut self.system_channel_id, p.system_channel_id, mode, report);
        merge_validated(
            "verification_level",
            &mut self.verification_level,
            p.verification_level,
            mode,
            report,
            |level| {
                if *level <= MAX_VERIFICATION_LEVEL {
                    Ok(())
                } else {
                    Err(format!("unknown verification level {level}"))
                }
            },
        );
        merge_value("member_count", &mut self.member_count, p.member_count, mode, report);
        merge_value("unavailable", &mut self.unavailable, p.unavailable, mode, report);
        self.resolve_pointers();
    }
}

impl EntityState for GuildState {
    const KIND: EntityKind = EntityKind::Guild;
    type Payload = GuildPayload;

    fn payload(payload: EntityPayload) -> Result<GuildPayload, EntityPayload> {
        match payload {
            EntityPayload::Guild(p) => Ok(p),
            other => Err(other),
        }
    }

    fn field(&self, name: &str) -> Option<Value> {
        Some(match name {
            "name" => json!(self.name),
            "icon" => json!(self.icon),
            "owner_id" => json!(self.owner_id),
            "afk_channel_id" => json!(self.afk_channel_id),
            "afk_timeout" => json!(self.afk_timeout),
            "system_channel_id" => json!(self.system_channel_id),
            "verification_level" => json!(self.verification_level),
            "member_count" => json!(self.member_count),
            "unavailable" => json!(self.unavailable),
            "channels" => ids(&self.channels),
            "roles" => ids(&self.roles),
            "emojis" => ids(&self.emojis),
            "members" => json!(self.members.keys().collect::<Vec<_>>()),
            _ => return None,
        })
    }

    fn is_read_only(field: &str) -> bool {
        matches!(field, "member_count" | "unavailable")
    }

    fn required_permissions(&self, _id: Snowflake, field: &str, _actor: Option<Snowflake>) -> Permissions {
        match field {
            "channels" => Permissions::MANAGE_CHANNELS,
            "roles" => Permissions::MANAGE_ROLES,
            "emojis" => Permissions::MANAGE_EMOJIS,
            "members" => Permissions::KICK_MEMBERS,
            _ => Permissions::MANAGE_GUILD,
        }
    }

    fn owner_guild(&self, id: Snowflake) -> Option<Snowflake> {
        Some(id)
    }

    fn set_child_deleted(&self, collection: &str, id: Snowflake, deleted: bool) -> bool {
        let found = match collection {
            "channels" => self.channel(id).map(|c| c.mark_deleted(deleted)),
            "roles" => self.role(id).map(|r| r.mark_deleted(deleted)),
            "emojis" => self.emoji(id).map(|e| e.mark_deleted(deleted)),
            "members" => self.member(id).map(|m| m.mark_deleted(deleted)),
            _ => None,
        };
        found.is_some()
    }

    /// Collections in the reply replace the owned ones the way a snapshot
    /// does, which needs the registry's caches; a detached guild only takes
    /// the scalars.
    fn apply_reply(entity: &Guild, payload: GuildPayload, change_set: &ChangeSet) -> MergeReport {
        let Some(registry) = entity.registry() else {
            return merge_reply(entity, payload, change_set);
        };
        let mut report = MergeReport::new();
        registry.merge_guild(entity, payload, MergeMode::Patch, Some(change_set), &mut report);
        report
    }

    fn splice_removed(&mut self, change_set: &ChangeSet) {
        let mut spliced = false;
        for id in change_set.removed("channels") {
            spliced |= self.unlink_channel(id).is_some();
        }
        for id in change_set.removed("roles") {
            spliced |= self.unlink_role(id).is_some();
        }
        for id in change_set.removed("emojis") {
            spliced |= self.unlink_emoji(id).is_some();
        }
        for id in change_set.removed("members") {
            spliced |= self.unlink_member(id).is_some();
        }
        if spliced {
            self.rebuild();
        }
    }
}

impl Guild {
    /// Capabilities `user` holds in this guild.
    ///
    /// The owner and holders of `ADMINISTRATOR` get every capability.
    /// Everyone else gets the union of the `@everyone` role (which shares the
    /// guild's identity) and their own roles.
    pub fn permissions_for(&self, user: Snowflake) -> Permissions {
        let state = self.snapshot();
        if state.owner_id == Some(user) {
            return Permissions::all();
        }

        let mut granted = state
            .role(self.id())
            .map(|everyone| everyone.snapshot().permissions)
            .unwrap_or_default();
        if let Some(member) = state.member(user) {
            for role_id in &member.snapshot().roles {
                if let Some(role) = state.role(*role_id) {
                    if !role.is_deleted() {
                        granted |= role.snapshot().permissions;
                    }
                }
            }
        }

        if granted.contains(Permissions::ADMINISTRATOR) {
            Permissions::all()
        } else {
            granted
        }
    }
}

#[cfg(test)]
mod tests {
    use snow_types::{ChannelKind, FieldState};

    use super::*;
    use crate::channel::ChannelState;
    use crate::member::MemberState;
    use crate::role::RoleState;

    fn sf(raw: u64) -> Snowflake {
        Snowflake::new(raw)
    }

    fn channel(id: u64, kind: ChannelKind, position: i32) -> Arc<Channel> {
        Arc::new(Channel::new(
            sf(id),
            ChannelState {
                guild_id: Some(sf(1)),
                kind,
                position,
                ..Default::default()
            },
        ))
    }

    fn role(id: u64, permissions: Permissions) -> Arc<Role> {
        Arc::new(Role::new(
            sf(id),
            RoleState {
                guild_id: Some(sf(1)),
                permissions,
                ..Default::default()
            },
        ))
    }

    fn member(user: u64, roles: &[u64]) -> Arc<Member> {
        Arc::new(Member::new(
            sf(user),
            MemberState {
                guild_id: Some(sf(1)),
                roles: roles.iter().map(|r| sf(*r)).collect(),
                ..Default::default()
            },
        ))
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    #[test]
    fn system_channel_follows_collection_replacement() {
        let guild = Guild::new(sf(1), GuildState::default());
        let first = channel(10, ChannelKind::Text, 0);
        guild.mutate(|s| {
            s.system_channel_id = Some(sf(10));
            s.replace_channels(vec![Arc::clone(&first)]);
            s.rebuild();
        });
        assert!(Arc::ptr_eq(guild.snapshot().system_channel().unwrap(), &first));

        // A full replace brings a new instance under the same identity.
        let second = channel(10, ChannelKind::Text, 0);
        guild.mutate(|s| {
            s.replace_channels(vec![Arc::clone(&second)]);
            s.rebuild();
        });
        assert!(Arc::ptr_eq(guild.snapshot().system_channel().unwrap(), &second));
        assert!(first.is_deleted());
    }

    #[test]
    fn system_channel_id_patch_resolves_immediately() {
        let guild = Guild::new(sf(1), GuildState::default());
        guild.mutate(|s| {
            s.replace_channels(vec![channel(10, ChannelKind::Text, 0)]);
            s.rebuild();
        });
        assert!(guild.snapshot().system_channel().is_none());

        let mut patch = GuildPayload::new(sf(1));
        patch.system_channel_id = FieldState::Present(sf(10));
        guild.merge(patch, MergeMode::Patch);
        assert_eq!(guild.snapshot().system_channel().map(|c| c.id()), Some(sf(10)));
    }

    #[test]
    fn voice_states_without_channel_are_dropped() {
        let guild = Guild::new(sf(1), GuildState::default());
        let mut join = snow_types::VoiceStatePayload::new(sf(7));
        join.channel_id = FieldState::Present(sf(20));
        guild.mutate(|s| {
            s.upsert_voice_state(join, MergeMode::Full, &mut MergeReport::new());
            s.rebuild();
        });
        assert_eq!(guild.snapshot().voice_membership().members_of(sf(20)), &[sf(7)]);

        let mut leave = snow_types::VoiceStatePayload::new(sf(7));
        leave.channel_id = FieldState::Null;
        guild.mutate(|s| {
            s.upsert_voice_state(leave, MergeMode::Patch, &mut MergeReport::new());
            s.rebuild();
        });
        assert!(guild.snapshot().voice_states().is_empty());
        assert_eq!(guild.snapshot().voice_membership().connected(), 0);
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    #[test]
    fn permissions_union_everyone_and_member_roles() {
        let guild = Guild::new(sf(1), GuildState::default());
        guild.mutate(|s| {
            s.owner_id = Some(sf(100));
            s.replace_roles(vec![
                role(1, Permissions::SEND_MESSAGES),
                role(2, Permissions::MANAGE_ROLES),
                role(3, Permissions::ADMINISTRATOR),
            ]);
            s.replace_members(
                [(sf(5), member(5, &[2])), (sf(6), member(6, &[3]))]
                    .into_iter()
                    .collect(),
            );
        });

        assert_eq!(
            guild.permissions_for(sf(5)),
            Permissions::SEND_MESSAGES | Permissions::MANAGE_ROLES
        );
        assert_eq!(guild.permissions_for(sf(6)), Permissions::all());
        assert_eq!(guild.permissions_for(sf(100)), Permissions::all());
        assert_eq!(guild.permissions_for(sf(9)), Permissions::SEND_MESSAGES);
    }

    #[test]
    fn deleted_roles_grant_nothing() {
        let guild = Guild::new(sf(1), GuildState::default());
        let mods = role(2, Permissions::MANAGE_ROLES);
        guild.mutate(|s| {
            s.replace_roles(vec![Arc::clone(&mods)]);
            s.replace_members([(sf(5), member(5, &[2]))].into_iter().collect());
        });
        mods.mark_deleted(true);
        assert_eq!(guild.permissions_for(sf(5)), Permissions::empty());
    }

    // -----------------------------------------------------------------------
    // Child deletion
    // -----------------------------------------------------------------------

    #[test]
    fn child_deleted_flag_and_splice() {
        let guild = Guild::new(sf(1), GuildState::default());
        let mods = role(2, Permissions::empty());
        guild.mutate(|s| {
            s.replace_roles(vec![Arc::clone(&mods)]);
            s.replace_members([(sf(5), member(5, &[2]))].into_iter().collect());
        });

        let state = guild.snapshot();
        assert!(state.set_child_deleted("roles", sf(2), true));
        assert!(!state.set_child_deleted("roles", sf(99), true));
        assert!(!state.set_child_deleted("stickers", sf(2), true));
        assert!(mods.is_deleted());
        assert_eq!(state.roles().len(), 1);

        let mut set = ChangeSet::new(EntityKind::Guild, sf(1));
        set.edits.push(snow_types::ChildEdit::Remove {
            collection: "roles".into(),
            id: sf(2),
        });
        guild.mutate(|s| s.splice_removed(&set));
        let state = guild.snapshot();
        assert!(state.roles().is_empty());
        assert!(state.member(sf(5)).unwrap().snapshot().roles.is_empty());
    }
}
