use std::collections::BTreeMap;
use std::mem;
use std::sync::{Arc, Weak};

use snow_cache::IdentityCache;
use snow_merge::{merge_collection, CollectionUpdate, Merge, MergeMode, MergeReport};
use snow_types::{
    ChangeSet, ChannelPayload, EmojiPayload, EntityKind, EntityPayload, FieldState, GuildPayload,
    MemberPayload, RolePayload, Snowflake, UserPayload, VoiceStatePayload,
};
use tracing::{debug, warn};

use crate::channel::{Channel, ChannelState};
use crate::emoji::{Emoji, EmojiState};
use crate::entity::{Entity, EntityState};
use crate::error::{ModelError, ModelResult};
use crate::guild::{Guild, GuildState};
use crate::member::{Member, MemberState};
use crate::role::{Role, RoleState};
use crate::scope::EntityScope;
use crate::user::{User, UserState};
use crate::voice::VoiceState;

/// What ingesting one payload did.
#[derive(Clone, Debug, PartialEq)]
pub struct Applied {
    pub kind: EntityKind,
    pub id: Snowflake,
    /// The guild whose collections or views were touched, if any.
    pub guild_id: Option<Snowflake>,
    pub created: bool,
    /// The owning guild's derived views were rebuilt.
    pub rebuilt: bool,
    pub report: MergeReport,
}

/// States whose entities the registry caches by identity. Members are
/// reached through their guild instead.
pub trait Registered: EntityState {
    fn cache(registry: &Registry) -> &IdentityCache<Entity<Self>>;
}

impl Registered for GuildState {
    fn cache(registry: &Registry) -> &IdentityCache<Guild> {
        &registry.guilds
    }
}

impl Registered for ChannelState {
    fn cache(registry: &Registry) -> &IdentityCache<Channel> {
        &registry.channels
    }
}

impl Registered for RoleState {
    fn cache(registry: &Registry) -> &IdentityCache<Role> {
        &registry.roles
    }
}

impl Registered for UserState {
    fn cache(registry: &Registry) -> &IdentityCache<User> {
        &registry.users
    }
}

impl Registered for EmojiState {
    fn cache(registry: &Registry) -> &IdentityCache<Emoji> {
        &registry.emojis
    }
}

/// The identity caches of every entity type plus the ingestion path.
///
/// Lock order: a guild's write lock may be held while one of its children's
/// (channel, role, emoji, member) is taken, never the other way round. Owned
/// children are resolved, merged and linked under their guild's lock.
pub struct Registry {
    guilds: IdentityCache<Guild>,
    channels: IdentityCache<Channel>,
    roles: IdentityCache<Role>,
    users: IdentityCache<User>,
    emojis: IdentityCache<Emoji>,
    this: Weak<Registry>,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            guilds: IdentityCache::new(),
            channels: IdentityCache::new(),
            roles: IdentityCache::new(),
            users: IdentityCache::new(),
            emojis: IdentityCache::new(),
            this: this.clone(),
        })
    }

    pub fn guilds(&self) -> &IdentityCache<Guild> {
        &self.guilds
    }

    pub fn channels(&self) -> &IdentityCache<Channel> {
        &self.channels
    }

    pub fn roles(&self) -> &IdentityCache<Role> {
        &self.roles
    }

    pub fn users(&self) -> &IdentityCache<User> {
        &self.users
    }

    pub fn emojis(&self) -> &IdentityCache<Emoji> {
        &self.emojis
    }

    pub fn guild(&self, id: Snowflake) -> Option<Arc<Guild>> {
        self.guilds.try_get(id)
    }

    pub fn channel(&self, id: Snowflake) -> Option<Arc<Channel>> {
        self.channels.try_get(id)
    }

    pub fn role(&self, id: Snowflake) -> Option<Arc<Role>> {
        self.roles.try_get(id)
    }

    pub fn user(&self, id: Snowflake) -> Option<Arc<User>> {
        self.users.try_get(id)
    }

    pub fn emoji(&self, id: Snowflake) -> Option<Arc<Emoji>> {
        self.emojis.try_get(id)
    }

    pub fn get<S: Registered>(&self, id: Snowflake) -> Option<Arc<Entity<S>>> {
        S::cache(self).try_get(id)
    }

    /// The cached entity, or an identity-only shell published under `id`.
    pub fn get_or_create<S: Registered>(&self, id: Snowflake) -> Arc<Entity<S>> {
        S::cache(self).get_or_create(id, |id| Entity::attached(id, S::default(), self.this.clone()))
    }

    pub fn member(&self, guild: Snowflake, user: Snowflake) -> Option<Arc<Member>> {
        self.guild(guild)?.snapshot().member(user).cloned()
    }

    /// Write context for an entity: its owning guild and the acting user.
    pub fn scope(&self, guild: Option<Snowflake>, actor: Option<Snowflake>) -> EntityScope {
        EntityScope::new(guild.and_then(|id| self.guild(id)), actor)
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Ingest one payload.
    pub fn apply(&self, payload: EntityPayload, mode: MergeMode) -> ModelResult<Applied> {
        match payload {
            EntityPayload::Guild(p) => Ok(self.apply_guild(p, mode).1),
            EntityPayload::Channel(p) => Ok(self.apply_channel(p, mode).1),
            EntityPayload::Role(p) => Ok(self.apply_role(p, mode).1),
            EntityPayload::Member(p) => self.apply_member(p, mode).map(|(_, applied)| applied),
            EntityPayload::User(p) => Ok(self.apply_user(p, mode).1),
            EntityPayload::Emoji(p) => Ok(self.apply_emoji(p, mode).1),
            EntityPayload::VoiceState(p) => self.apply_voice_state(p, mode),
            EntityPayload::Message(_) => Err(ModelError::Unsupported(EntityKind::Message)),
        }
    }

    fn upsert<S>(
        &self,
        cache: &IdentityCache<Entity<S>>,
        id: Snowflake,
        payload: S::Payload,
        mode: MergeMode,
    ) -> (Arc<Entity<S>>, bool, MergeReport)
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        let (entity, created) =
            cache.get_or_create_with(id, |id| Entity::attached(id, S::default(), self.this.clone()), |_| {});
        if created {
            debug!(kind = %S::KIND, %id, "entity created");
        }
        let report = entity.merge(payload, mode);
        (entity, created, report)
    }

    /// The cached guild, or a shell published under `id` for children that
    /// arrive before their guild does.
    fn guild_shell(&self, id: Snowflake) -> Arc<Guild> {
        self.guilds
            .get_or_create(id, |id| Guild::attached(id, GuildState::default(), self.this.clone()))
    }

    /// Ingest a guild snapshot.
    ///
    /// A payload flagged `unavailable` is an outage placeholder: only the
    /// flag changes and every other field keeps its last known value.
    /// Otherwise scalars merge under `mode`, each owned collection the
    /// payload sends replaces the current one (children it drops are marked
    /// deleted and evicted), and views are rebuilt in the same snapshot.
    pub fn apply_guild(&self, p: GuildPayload, mode: MergeMode) -> (Arc<Guild>, Applied) {
        let id = p.id;
        let (guild, created) =
            self.guilds
                .get_or_create_with(id, |id| Guild::attached(id, GuildState::default(), self.this.clone()), |_| {});
        let mut report = MergeReport::new();

        if p.unavailable == FieldState::Present(true) {
            guild.mutate(|state| {
                if !state.unavailable {
                    state.unavailable = true;
                    report.record_change("unavailable");
                }
            });
            warn!(guild = %id, "guild unavailable, serving last known state");
            let applied = Applied {
                kind: EntityKind::Guild,
                id,
                guild_id: Some(id),
                created,
                rebuilt: false,
                report,
            };
            return (guild, applied);
        }

        self.merge_guild(&guild, p, mode, None, &mut report);
        debug!(
            guild = %id,
            ?mode,
            created,
            changed = ?report.changed,
            skipped = report.skipped.len(),
            "guild ingested"
        );
        let applied = Applied {
            kind: EntityKind::Guild,
            id,
            guild_id: Some(id),
            created,
            rebuilt: true,
            report,
        };
        (guild, applied)
    }

    /// Merge a guild payload and every owned collection it sends.
    ///
    /// Children are resolved against the caches, merged and swapped into the
    /// guild under the guild's write lock, and children the payload dropped
    /// are evicted before the lock is released. A concurrent snapshot of the
    /// same guild therefore never installs a child another one just dropped.
    /// With `committed`, children that change set removed are spliced out
    /// first.
    pub(crate) fn merge_guild(
        &self,
        guild: &Guild,
        mut p: GuildPayload,
        mode: MergeMode,
        committed: Option<&ChangeSet>,
        report: &mut MergeReport,
    ) {
        let id = guild.id();
        let channels = owned_items(mem::take(&mut p.channels), |mut c| {
            adopt(&mut c.guild_id, id);
            (c.id, c)
        });
        let roles = owned_items(mem::take(&mut p.roles), |mut r| {
            adopt(&mut r.guild_id, id);
            (r.id, r)
        });
        let emojis = owned_items(mem::take(&mut p.emojis), |mut e| {
            adopt(&mut e.guild_id, id);
            (e.id, e)
        });
        let members = owned_items(mem::take(&mut p.members), |mut m| {
            adopt(&mut m.guild_id, id);
            let user = mem::take(&mut m.user);
            let user_id = user.id;
            self.upsert(&self.users, user_id, user, MergeMode::Patch);
            (user_id, m)
        });
        let voice_states = owned_items(mem::take(&mut p.voice_states), |v| {
            let mut state = VoiceState::new(v.user_id);
            state.merge(v, MergeMode::Full, report);
            state
        });

        guild.mutate(|state| {
            state.merge(p, mode, report);
            if let Some(change_set) = committed {
                state.splice_removed(change_set);
            }

            let mut dropped = Dropped::default();
            if let Some(items) = channels {
                let next = self.merge_owned(&self.channels, state.channels(), items, mode, report);
                dropped.channels = state.replace_channels(next);
                report.record_change("channels");
            }
            if let Some(items) = roles {
                let next = self.merge_owned(&self.roles, state.roles(), items, mode, report);
                dropped.roles = state.replace_roles(next);
                report.record_change("roles");
            }
            if let Some(items) = emojis {
                let next = self.merge_owned(&self.emojis, state.emojis(), items, mode, report);
                dropped.emojis = state.replace_emojis(next);
                report.record_change("emojis");
            }
            if let Some(items) = members {
                let next: BTreeMap<Snowflake, Arc<Member>> = items
                    .into_iter()
                    .map(|(user_id, payload)| {
                        let member = state
                            .member(user_id)
                            .cloned()
                            .unwrap_or_else(|| self.new_member(user_id));
                        let child = member.merge(payload, mode);
                        report.skipped.extend(child.skipped);
                        (user_id, member)
                    })
                    .collect();
                state.replace_members(next);
                report.record_change("members");
            }
            if let Some(next) = voice_states {
                state.set_voice_states(next);
                report.record_change("voice_states");
            }
            state.rebuild();
            self.evict(&dropped);
        });
    }

    /// Resolve and merge the children of one owned collection. Called with
    /// the guild's write lock held; `owned` is the collection being replaced.
    fn merge_owned<S>(
        &self,
        cache: &IdentityCache<Entity<S>>,
        owned: &[Arc<Entity<S>>],
        items: Vec<(Snowflake, S::Payload)>,
        mode: MergeMode,
        report: &mut MergeReport,
    ) -> Vec<Arc<Entity<S>>>
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        items
            .into_iter()
            .map(|(id, payload)| {
                let (child, _) = self.resolve_owned(cache, owned, id);
                report.skipped.extend(child.merge(payload, mode).skipped);
                child
            })
            .collect()
    }

    /// The live instance of a guild-owned child, creating it if needed.
    ///
    /// Must be called with the owning guild's write lock held. A cached
    /// instance that is deleted and no longer owned by the guild was dropped
    /// or spliced out and is replaced by a fresh one; a deleted child the
    /// guild still owns is awaiting its commit and is kept.
    fn resolve_owned<S: EntityState>(
        &self,
        cache: &IdentityCache<Entity<S>>,
        owned: &[Arc<Entity<S>>],
        id: Snowflake,
    ) -> (Arc<Entity<S>>, bool) {
        if let Some(current) = cache.try_get(id) {
            if !current.is_deleted() || owned.iter().any(|c| Arc::ptr_eq(c, &current)) {
                return (current, false);
            }
            cache.remove_if(id, |cached| std::ptr::eq(cached, Arc::as_ptr(&current)));
            debug!(kind = %S::KIND, %id, "dead instance replaced");
        }
        let (entity, created) =
            cache.get_or_create_with(id, |id| Entity::attached(id, S::default(), self.this.clone()), |_| {});
        if created {
            debug!(kind = %S::KIND, %id, "entity created");
        }
        (entity, created)
    }

    /// Upsert a guild-owned child and link it into `guild_id` in one critical
    /// section of the guild. Without a guild the child is only cached.
    fn apply_owned<S>(
        &self,
        cache: &IdentityCache<Entity<S>>,
        (id, payload): (Snowflake, S::Payload),
        guild_id: Option<Snowflake>,
        mode: MergeMode,
        owned: fn(&GuildState) -> &[Arc<Entity<S>>],
        link: fn(&mut GuildState, &Arc<Entity<S>>),
    ) -> (Arc<Entity<S>>, bool, MergeReport, bool)
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        let Some(guild) = guild_id.map(|g| self.guild_shell(g)) else {
            let (child, created, report) = self.upsert(cache, id, payload, mode);
            return (child, created, report, false);
        };
        guild.mutate(|state| {
            let (child, created) = self.resolve_owned(cache, owned(state), id);
            let report = child.merge(payload, mode);
            link(state, &child);
            state.rebuild();
            (child, created, report, true)
        })
    }

    fn new_member(&self, user_id: Snowflake) -> Arc<Member> {
        Arc::new(Member::attached(user_id, MemberState::default(), self.this.clone()))
    }

    /// Evict dropped children. An identity that was re-created meanwhile
    /// holds a live instance and stays cached.
    fn evict(&self, dropped: &Dropped) {
        for id in &dropped.channels {
            self.channels.remove_if(*id, Channel::is_deleted);
        }
        for id in &dropped.roles {
            self.roles.remove_if(*id, Role::is_deleted);
        }
        for id in &dropped.emojis {
            self.emojis.remove_if(*id, Emoji::is_deleted);
        }
    }

    /// Ingest a channel create or update and relink it into its guild.
    pub fn apply_channel(&self, p: ChannelPayload, mode: MergeMode) -> (Arc<Channel>, Applied) {
        let id = p.id;
        let guild_id = target_guild(&self.channels, id, &p.guild_id, mode);
        let (channel, created, report, rebuilt) = self.apply_owned(
            &self.channels,
            (id, p),
            guild_id,
            mode,
            GuildState::channels,
            GuildState::link_channel,
        );
        let applied = Applied {
            kind: EntityKind::Channel,
            id,
            guild_id,
            created,
            rebuilt,
            report,
        };
        (channel, applied)
    }

    pub fn apply_role(&self, p: RolePayload, mode: MergeMode) -> (Arc<Role>, Applied) {
        let id = p.id;
        let guild_id = target_guild(&self.roles, id, &p.guild_id, mode);
        let (role, created, report, rebuilt) = self.apply_owned(
            &self.roles,
            (id, p),
            guild_id,
            mode,
            GuildState::roles,
            GuildState::link_role,
        );
        let applied = Applied {
            kind: EntityKind::Role,
            id,
            guild_id,
            created,
            rebuilt,
            report,
        };
        (role, applied)
    }

    pub fn apply_emoji(&self, p: EmojiPayload, mode: MergeMode) -> (Arc<Emoji>, Applied) {
        let id = p.id;
        let guild_id = target_guild(&self.emojis, id, &p.guild_id, mode);
        let (emoji, created, report, rebuilt) = self.apply_owned(
            &self.emojis,
            (id, p),
            guild_id,
            mode,
            GuildState::emojis,
            GuildState::link_emoji,
        );
        let applied = Applied {
            kind: EntityKind::Emoji,
            id,
            guild_id,
            created,
            rebuilt,
            report,
        };
        (emoji, applied)
    }

    pub fn apply_user(&self, p: UserPayload, mode: MergeMode) -> (Arc<User>, Applied) {
        let id = p.id;
        let (user, created, report) = self.upsert(&self.users, id, p, mode);
        let applied = Applied {
            kind: EntityKind::User,
            id,
            guild_id: None,
            created,
            rebuilt: false,
            report,
        };
        (user, applied)
    }

    /// Ingest a member. The nested user is merged into the user cache.
    pub fn apply_member(&self, mut p: MemberPayload, mode: MergeMode) -> ModelResult<(Arc<Member>, Applied)> {
        let user_id = p.user.id;
        let guild_id = p.guild_id.present().copied().ok_or(ModelError::MissingGuild {
            kind: EntityKind::Member,
            id: user_id,
        })?;
        let user = mem::take(&mut p.user);
        self.upsert(&self.users, user_id, user, MergeMode::Patch);

        let guild = self.guild_shell(guild_id);
        let existing = guild.snapshot().member(user_id).cloned();
        let (member, created) = match existing {
            Some(member) => (member, false),
            None => guild.mutate(|state| match state.member(user_id) {
                Some(member) => (Arc::clone(member), false),
                None => {
                    let member = self.new_member(user_id);
                    state.members.insert(user_id, Arc::clone(&member));
                    (member, true)
                }
            }),
        };
        let report = member.merge(p, mode);

        let applied = Applied {
            kind: EntityKind::Member,
            id: user_id,
            guild_id: Some(guild_id),
            created,
            rebuilt: false,
            report,
        };
        Ok((member, applied))
    }

    /// Ingest a voice state update. A null channel removes the state.
    pub fn apply_voice_state(&self, p: VoiceStatePayload, mode: MergeMode) -> ModelResult<Applied> {
        let user_id = p.user_id;
        let guild_id = p.guild_id.present().copied().ok_or(ModelError::MissingGuild {
            kind: EntityKind::VoiceState,
            id: user_id,
        })?;
        let guild = self.guild_shell(guild_id);
        let report = guild.mutate(|state| {
            let mut report = MergeReport::new();
            state.upsert_voice_state(p, mode, &mut report);
            state.rebuild();
            report
        });
        Ok(Applied {
            kind: EntityKind::VoiceState,
            id: user_id,
            guild_id: Some(guild_id),
            created: false,
            rebuilt: true,
            report,
        })
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Ingest a delete event: mark the entity deleted, splice it out of its
    /// guild and evict it. Returns `false` if nothing was known about it.
    pub fn remove(&self, kind: EntityKind, id: Snowflake, guild_id: Option<Snowflake>) -> ModelResult<bool> {
        let removed = match kind {
            EntityKind::Guild => self.guilds.remove(id).map(|g| g.mark_deleted(true)).is_some(),
            EntityKind::Channel => self.remove_child(&self.channels, id, guild_id, GuildState::unlink_channel),
            EntityKind::Role => self.remove_child(&self.roles, id, guild_id, GuildState::unlink_role),
            EntityKind::Emoji => self.remove_child(&self.emojis, id, guild_id, GuildState::unlink_emoji),
            EntityKind::User => self.users.remove(id).map(|u| u.mark_deleted(true)).is_some(),
            EntityKind::Member => {
                let guild_id = guild_id.ok_or(ModelError::MissingGuild { kind, id })?;
                self.guild(guild_id)
                    .and_then(|guild| guild.mutate(|state| state.unlink_member(id)))
                    .map(|member| member.mark_deleted(true))
                    .is_some()
            }
            EntityKind::VoiceState => {
                let guild_id = guild_id.ok_or(ModelError::MissingGuild { kind, id })?;
                self.guild(guild_id).is_some_and(|guild| {
                    guild.mutate(|state| {
                        let removed = state.remove_voice_state(id);
                        state.rebuild();
                        removed
                    })
                })
            }
            EntityKind::Message => return Err(ModelError::Unsupported(kind)),
        };
        debug!(%kind, %id, removed, "delete ingested");
        Ok(removed)
    }

    fn remove_child<S: EntityState>(
        &self,
        cache: &IdentityCache<Entity<S>>,
        id: Snowflake,
        guild_id: Option<Snowflake>,
        unlink: fn(&mut GuildState, Snowflake) -> Option<Arc<Entity<S>>>,
    ) -> bool {
        let cached = cache.remove(id);
        let owner = guild_id.or_else(|| cached.as_ref().and_then(|c| c.owner_guild()));
        let unlinked = owner.and_then(|g| self.guild(g)).and_then(|guild| {
            guild.mutate(|state| {
                let unlinked = unlink(state, id);
                if unlinked.is_some() {
                    state.rebuild();
                }
                unlinked
            })
        });

        let mut found = false;
        for entity in cached.iter().chain(unlinked.iter()) {
            entity.mark_deleted(true);
            found = true;
        }
        found
    }

    /// Bookkeeping after a successful commit on `kind`/`id`.
    pub(crate) fn committed(&self, kind: EntityKind, id: Snowflake, guild_id: Option<Snowflake>, change_set: &ChangeSet) {
        match kind {
            EntityKind::Guild => self.evict(&Dropped {
                channels: change_set.removed("channels"),
                roles: change_set.removed("roles"),
                emojis: change_set.removed("emojis"),
            }),
            EntityKind::Channel => {
                // Position, parent or kind may have moved the channel.
                if let Some(guild) = guild_id.and_then(|g| self.guild(g)) {
                    guild.mutate(|state| state.rebuild());
                }
            }
            _ => {}
        }
        debug!(%kind, %id, "commit bookkeeping done");
    }
}

#[derive(Default)]
struct Dropped {
    channels: Vec<Snowflake>,
    roles: Vec<Snowflake>,
    emojis: Vec<Snowflake>,
}

/// Items of an owned collection the payload sent, or `None` to keep the
/// current collection.
fn owned_items<P, T>(field: FieldState<Vec<P>>, f: impl FnMut(P) -> T) -> Option<Vec<T>> {
    match merge_collection(field) {
        CollectionUpdate::Replace(items) => Some(items.into_iter().map(f).collect()),
        CollectionUpdate::Keep => None,
    }
}

/// The guild a child update belongs to once merged: the one it names, or
/// for a patch that leaves the guild out, the one it already belongs to.
fn target_guild<S: EntityState>(
    cache: &IdentityCache<Entity<S>>,
    id: Snowflake,
    sent: &FieldState<Snowflake>,
    mode: MergeMode,
) -> Option<Snowflake> {
    match sent {
        FieldState::Present(guild) => Some(*guild),
        FieldState::Null => None,
        FieldState::Absent => match mode {
            MergeMode::Full => None,
            MergeMode::Patch => cache.try_get(id).and_then(|child| child.owner_guild()),
        },
    }
}

/// Children listed inside a guild payload belong to that guild even when
/// their own payload leaves the guild id out.
fn adopt(guild_id: &mut FieldState<Snowflake>, id: Snowflake) {
    if guild_id.is_absent() {
        *guild_id = FieldState::Present(id);
    }
}
