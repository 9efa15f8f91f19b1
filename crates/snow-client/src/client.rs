use std::sync::Arc;

use serde::Serialize;
use snow_cache::{CacheError, CacheResult, IdentityCache};
use snow_changes::{write_direct, ChangeSession, CommitOutcome, Scope, Trackable};
use snow_merge::{Merge, MergeMode, MergeReport};
use snow_model::{Applied, Entity, EntityState, Guild, Member, Registered, Registry};
use snow_reactions::{Message, ReactionReconciler, Repaired};
use snow_transport::Transport;
use snow_types::{EntityKind, EntityPayload, MessagePayload, ReactionEmoji, ReactionEvent, Snowflake};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::event::CacheEvent;

/// Owned collections a guild commit can remove children from.
const CHILD_COLLECTIONS: [(&str, EntityKind); 4] = [
    ("channels", EntityKind::Channel),
    ("roles", EntityKind::Role),
    ("emojis", EntityKind::Emoji),
    ("members", EntityKind::Member),
];

/// One handle over the whole cache.
pub struct Client {
    config: ClientConfig,
    registry: Arc<Registry>,
    messages: IdentityCache<Message>,
    transport: Arc<dyn Transport>,
    reconciler: ReactionReconciler,
    events: broadcast::Sender<CacheEvent>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let reconciler = ReactionReconciler::new(Arc::clone(&transport), config.reactions.clone());
        info!(self_id = ?config.self_id, "client ready");
        Self {
            config,
            registry: Registry::new(),
            messages: IdentityCache::new(),
            transport,
            reconciler,
            events,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Receive every [`CacheEvent`] published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    // ---- Ingestion ----

    /// Apply one decoded payload. `full` says the payload is a complete
    /// snapshot; otherwise it is merged as a patch.
    pub fn ingest(&self, kind: EntityKind, id: Snowflake, payload: EntityPayload, full: bool) -> ClientResult<Applied> {
        if payload.kind() != kind || payload.id() != id {
            return Err(ClientError::PayloadMismatch {
                kind,
                id,
                found_kind: payload.kind(),
                found_id: payload.id(),
            });
        }
        self.ingest_payload(payload, MergeMode::from_full_flag(full))
    }

    fn ingest_payload(&self, payload: EntityPayload, mode: MergeMode) -> ClientResult<Applied> {
        let applied = match payload {
            EntityPayload::Message(p) => self.ingest_message(p)?,
            other => self.registry.apply(other, mode)?,
        };
        for skipped in &applied.report.skipped {
            warn!(kind = %applied.kind, id = %applied.id, error = %skipped, "payload field skipped");
        }
        debug!(
            kind = %applied.kind,
            id = %applied.id,
            ?mode,
            created = applied.created,
            "payload ingested"
        );

        self.publish(CacheEvent::Upserted {
            kind: applied.kind,
            id: applied.id,
            guild_id: applied.guild_id,
            created: applied.created,
        });
        if let (true, Some(guild_id)) = (applied.rebuilt, applied.guild_id) {
            self.publish(CacheEvent::ViewsRebuilt { guild_id });
        }
        Ok(applied)
    }

    fn ingest_message(&self, p: MessagePayload) -> ClientResult<Applied> {
        let self_id = self.config.self_id;
        let (message, created) = self
            .messages
            .get_or_create_with(p.id, |_| Message::shell(&p, self_id), |_| {});
        let id = p.id;
        let mut report = MergeReport::new();
        if message.merge(p)? {
            report.record_change("reactions");
        }
        Ok(Applied {
            kind: EntityKind::Message,
            id,
            guild_id: message.guild_id(),
            created,
            rebuilt: false,
            report,
        })
    }

    /// Apply a delete event. Returns `false` if the entity was not cached.
    pub fn ingest_delete(&self, kind: EntityKind, id: Snowflake, guild_id: Option<Snowflake>) -> ClientResult<bool> {
        let removed = match kind {
            EntityKind::Message => self.messages.remove(id).map(|m| m.mark_deleted(true)).is_some(),
            _ => self.registry.remove(kind, id, guild_id)?,
        };
        if removed {
            self.publish(CacheEvent::Deleted { kind, id });
        }
        Ok(removed)
    }

    /// Apply a reaction event to its cached message. Events for messages
    /// that are not cached are ignored.
    pub fn ingest_reaction(&self, event: &ReactionEvent) -> ClientResult<bool> {
        let Some(message) = self.messages.try_get(event.message_id()) else {
            debug!(message = %event.message_id(), "reaction for uncached message ignored");
            return Ok(false);
        };
        Ok(message.apply_event(event)?)
    }

    // ---- Reads ----

    pub fn try_get<S: Registered>(&self, id: Snowflake) -> Option<Arc<Entity<S>>> {
        self.registry.get::<S>(id)
    }

    pub fn get_or_create<S: Registered>(&self, id: Snowflake) -> Arc<Entity<S>> {
        self.registry.get_or_create::<S>(id)
    }

    pub fn guild(&self, id: Snowflake) -> Option<Arc<Guild>> {
        self.registry.guild(id)
    }

    pub fn member(&self, guild: Snowflake, user: Snowflake) -> Option<Arc<Member>> {
        self.registry.member(guild, user)
    }

    pub fn message(&self, id: Snowflake) -> Option<Arc<Message>> {
        self.messages.try_get(id)
    }

    /// The cached entity, downloading and ingesting it on a miss.
    ///
    /// Concurrent misses for one identity share a single fetch. `Ok(None)`
    /// means the remote service reports no such entity.
    pub async fn get_or_download<S: Registered>(&self, id: Snowflake) -> ClientResult<Option<Arc<Entity<S>>>> {
        let found = S::cache(&self.registry)
            .get_or_download(id, || async move {
                if !self.download(S::KIND, id).await? {
                    return Ok(None);
                }
                Ok(self.registry.get::<S>(id))
            })
            .await?;
        Ok(found)
    }

    pub async fn get_or_download_message(&self, id: Snowflake) -> ClientResult<Option<Arc<Message>>> {
        let found = self
            .messages
            .get_or_download(id, || async move {
                if !self.download(EntityKind::Message, id).await? {
                    return Ok(None);
                }
                Ok(self.messages.try_get(id))
            })
            .await?;
        Ok(found)
    }

    /// Fetch one entity and ingest it as a full snapshot. Returns `false`
    /// when the remote service does not know it.
    async fn download(&self, kind: EntityKind, id: Snowflake) -> CacheResult<bool> {
        let after = self.config.fetch_timeout();
        let payload = match tokio::time::timeout(after, self.transport.fetch(kind, id)).await {
            Err(_) => {
                warn!(%kind, %id, ?after, "download timed out");
                return Err(CacheError::Timeout { kind, id, after });
            }
            Ok(Err(error)) => {
                warn!(%kind, %id, %error, "download failed");
                return Err(CacheError::Remote(error.to_string()));
            }
            Ok(Ok(None)) => return Ok(false),
            Ok(Ok(Some(payload))) => payload,
        };

        if payload.kind() != kind {
            return Err(CacheError::Remote(format!(
                "expected a {kind} payload, got {}",
                payload.kind()
            )));
        }
        if payload.id() != id {
            return Err(CacheError::IdentityMismatch {
                requested: id,
                fetched: payload.id(),
            });
        }
        self.ingest_payload(payload, MergeMode::Full)
            .map_err(|e| CacheError::Remote(e.to_string()))?;
        Ok(true)
    }

    // ---- Changes ----

    fn scope_for<S: EntityState>(&self, entity: &Entity<S>) -> Arc<dyn Scope> {
        Arc::new(self.registry.scope(entity.owner_guild(), self.config.self_id))
    }

    /// Start staging changes on `entity`. Fails with `Locked` if another
    /// session is open on it.
    pub fn begin_changes<S>(&self, entity: Arc<Entity<S>>) -> ClientResult<ChangeSession<Entity<S>>>
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        let scope = self.scope_for(&entity);
        let session = ChangeSession::begin(entity, scope)?;
        Ok(session.with_timeout(self.config.changes.commit_timeout()))
    }

    /// Like [`Self::begin_changes`], but waits for the entity to become idle.
    pub async fn begin_queued<S>(&self, entity: Arc<Entity<S>>) -> ClientResult<ChangeSession<Entity<S>>>
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        let scope = self.scope_for(&entity);
        let session = ChangeSession::begin_queued(entity, scope).await?;
        Ok(session.with_timeout(self.config.changes.commit_timeout()))
    }

    /// Commit a session in one round-trip.
    pub async fn apply_changes<T: Trackable>(
        &self,
        session: ChangeSession<T>,
        reason: Option<String>,
    ) -> ClientResult<CommitOutcome> {
        let kind = session.entity().kind();
        let id = session.entity().id();
        let outcome = session.apply(self.transport.as_ref(), reason).await?;
        self.committed(kind, id, &outcome);
        Ok(outcome)
    }

    /// Write one configured direct field without opening a session.
    pub async fn write_direct<S>(
        &self,
        entity: Arc<Entity<S>>,
        field: &str,
        value: impl Serialize,
    ) -> ClientResult<CommitOutcome>
    where
        S: EntityState + Merge<<S as EntityState>::Payload>,
    {
        let id = entity.id();
        let scope = self.scope_for(&entity);
        let outcome = write_direct(
            entity,
            scope,
            &self.config.changes,
            self.transport.as_ref(),
            field,
            value,
        )
        .await?;
        self.committed(S::KIND, id, &outcome);
        Ok(outcome)
    }

    /// Remove a role from its guild. The role reads as deleted at once; the
    /// guild's role list changes only after the commit succeeds.
    pub async fn delete_role(
        &self,
        guild_id: Snowflake,
        role_id: Snowflake,
        reason: Option<String>,
    ) -> ClientResult<CommitOutcome> {
        let guild = self.registry.guild(guild_id).ok_or(ClientError::NotFound {
            kind: EntityKind::Guild,
            id: guild_id,
        })?;
        let mut session = self.begin_changes(guild)?;
        session.remove_child("roles", role_id)?;
        self.apply_changes(session, reason).await
    }

    fn committed(&self, kind: EntityKind, id: Snowflake, outcome: &CommitOutcome) {
        let CommitOutcome::Applied { change_set, .. } = outcome else {
            return;
        };
        self.publish(CacheEvent::CommitApplied {
            kind,
            id,
            change_set: change_set.id,
        });
        if kind != EntityKind::Guild {
            return;
        }
        self.publish(CacheEvent::ViewsRebuilt { guild_id: id });
        for (collection, child_kind) in CHILD_COLLECTIONS {
            for child in change_set.removed(collection) {
                self.publish(CacheEvent::Deleted {
                    kind: child_kind,
                    id: child,
                });
            }
        }
    }

    // ---- Reactions ----

    /// Re-download up to `max_users` reactors of one emoji on a cached
    /// message and install them.
    pub async fn repair_reactions(
        &self,
        message_id: Snowflake,
        emoji: &ReactionEmoji,
        max_users: u8,
    ) -> ClientResult<Repaired> {
        let message = self.cached_message(message_id)?;
        let repaired = self.reconciler.repair(&message, emoji, max_users).await?;
        self.absorb_repair(&repaired);
        Ok(repaired)
    }

    /// Repair the message's desynchronized emoji, up to the configured cap.
    pub async fn repair_desynchronized(&self, message_id: Snowflake) -> ClientResult<Vec<Repaired>> {
        let message = self.cached_message(message_id)?;
        let repaired = self.reconciler.repair_desynchronized(&message).await?;
        for r in &repaired {
            self.absorb_repair(r);
        }
        Ok(repaired)
    }

    fn cached_message(&self, id: Snowflake) -> ClientResult<Arc<Message>> {
        self.messages.try_get(id).ok_or(ClientError::NotFound {
            kind: EntityKind::Message,
            id,
        })
    }

    fn absorb_repair(&self, repaired: &Repaired) {
        for user in &repaired.users {
            self.registry.apply_user(user.clone(), MergeMode::Patch);
        }
        self.publish(CacheEvent::ReactionsRepaired {
            message_id: repaired.message_id,
            emoji: repaired.emoji.clone(),
            count: repaired.count,
        });
    }
}
