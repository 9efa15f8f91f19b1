use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use arc_swap::ArcSwap;
use serde_json::Value;
use snow_cache::Cached;
use snow_changes::{ChangeError, ChangeResult, ChangeTracker, Trackable};
use snow_merge::{Merge, MergeMode, MergeReport};
use snow_types::{ChangeSet, EntityKind, EntityPayload, Permissions, Snowflake};
use tracing::debug;

use crate::registry::Registry;

/// Per-type behavior of an entity's state snapshot.
pub trait EntityState: Clone + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    /// The payload shape this state merges.
    type Payload: Send;

    /// Take this state's payload out of an [`EntityPayload`], or hand it back.
    fn payload(payload: EntityPayload) -> Result<Self::Payload, EntityPayload>;

    /// JSON form of a trackable field or owned collection (as child ids).
    fn field(&self, name: &str) -> Option<Value>;

    fn is_read_only(_field: &str) -> bool {
        false
    }

    /// Capabilities `actor` needs to change `field` on entity `id`.
    fn required_permissions(&self, id: Snowflake, field: &str, actor: Option<Snowflake>) -> Permissions;

    /// The guild whose availability and permissions govern writes.
    fn owner_guild(&self, id: Snowflake) -> Option<Snowflake>;

    fn set_child_deleted(&self, _collection: &str, _id: Snowflake, _deleted: bool) -> bool {
        false
    }

    /// Remove children deleted by a successful commit from owned collections.
    fn splice_removed(&mut self, _change_set: &ChangeSet) {}

    /// Merge the reply to a successful commit into `entity`.
    fn apply_reply(entity: &Entity<Self>, payload: Self::Payload, change_set: &ChangeSet) -> MergeReport
    where
        Self: Merge<Self::Payload>,
    {
        merge_reply(entity, payload, change_set)
    }
}

/// Patch-merge a commit reply into the scalar fields and splice out the
/// children the change set removed.
pub(crate) fn merge_reply<S>(entity: &Entity<S>, payload: S::Payload, change_set: &ChangeSet) -> MergeReport
where
    S: EntityState + Merge<<S as EntityState>::Payload>,
{
    entity.mutate(|state| {
        let mut report = MergeReport::new();
        state.merge(payload, MergeMode::Patch, &mut report);
        state.splice_removed(change_set);
        report
    })
}

/// One cached entity: identity, current snapshot and bookkeeping.
///
/// The snapshot is replaced as a whole on every change, so a reader holding
/// one never observes a partially applied merge.
pub struct Entity<S> {
    id: Snowflake,
    state: ArcSwap<S>,
    write: Mutex<()>,
    deleted: AtomicBool,
    locked_fields: RwLock<BTreeSet<String>>,
    tracker: ChangeTracker,
    registry: Weak<Registry>,
}

impl<S: EntityState> Entity<S> {
    /// A detached entity, not owned by any registry.
    pub fn new(id: Snowflake, state: S) -> Self {
        Self::attached(id, state, Weak::new())
    }

    pub(crate) fn attached(id: Snowflake, state: S, registry: Weak<Registry>) -> Self {
        Self {
            id,
            state: ArcSwap::from_pointee(state),
            write: Mutex::new(()),
            deleted: AtomicBool::new(false),
            locked_fields: RwLock::new(BTreeSet::new()),
            tracker: ChangeTracker::new(),
            registry,
        }
    }

    pub fn id(&self) -> Snowflake {
        self.id
    }

    /// The current state. Cheap; clones an `Arc`.
    pub fn snapshot(&self) -> Arc<S> {
        self.state.load_full()
    }

    /// Apply `f` to a copy of the state and publish the copy.
    ///
    /// Calls are serialized per entity, so two writers never lose each
    /// other's update. `f` must not mutate another entity that could in turn
    /// mutate this one.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let _guard = self.write.lock().expect("lock poisoned");
        let mut next = S::clone(&self.state.load());
        let result = f(&mut next);
        self.state.store(Arc::new(next));
        result
    }

    /// Merge a payload under this entity's write lock.
    pub fn merge(&self, payload: S::Payload, mode: MergeMode) -> MergeReport
    where
        S: Merge<S::Payload>,
    {
        self.mutate(|state| {
            let mut report = MergeReport::new();
            state.merge(payload, mode, &mut report);
            report
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Set the deleted flag, returning the previous value.
    pub fn mark_deleted(&self, deleted: bool) -> bool {
        let previous = self.deleted.swap(deleted, Ordering::AcqRel);
        if previous != deleted {
            debug!(kind = %S::KIND, id = %self.id, deleted, "deleted flag changed");
        }
        previous
    }

    /// Refuse staged writes to `field` until unlocked.
    pub fn lock_field(&self, field: impl Into<String>) {
        self.locked_fields
            .write()
            .expect("lock poisoned")
            .insert(field.into());
    }

    pub fn unlock_field(&self, field: &str) -> bool {
        self.locked_fields.write().expect("lock poisoned").remove(field)
    }

    pub fn is_field_locked(&self, field: &str) -> bool {
        self.locked_fields.read().expect("lock poisoned").contains(field)
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn owner_guild(&self) -> Option<Snowflake> {
        self.snapshot().owner_guild(self.id)
    }

    pub(crate) fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.upgrade()
    }
}

impl<S: fmt::Debug> fmt::Debug for Entity<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("deleted", &self.deleted.load(Ordering::Relaxed))
            .field("state", &self.state.load_full())
            .finish()
    }
}

impl<S: EntityState> Cached for Entity<S> {
    const KIND: EntityKind = S::KIND;

    fn id(&self) -> Snowflake {
        self.id
    }
}

impl<S> Trackable for Entity<S>
where
    S: EntityState + Merge<<S as EntityState>::Payload>,
{
    fn kind(&self) -> EntityKind {
        S::KIND
    }

    fn id(&self) -> Snowflake {
        self.id
    }

    fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    fn is_deleted(&self) -> bool {
        Entity::is_deleted(self)
    }

    fn is_field_locked(&self, field: &str) -> bool {
        Entity::is_field_locked(self, field)
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        self.snapshot().field(field)
    }

    fn is_read_only(&self, field: &str) -> bool {
        S::is_read_only(field)
    }

    fn required_permissions(&self, field: &str, actor: Option<Snowflake>) -> Permissions {
        self.snapshot().required_permissions(self.id, field, actor)
    }

    fn set_child_deleted(&self, collection: &str, id: Snowflake, deleted: bool) -> bool {
        self.snapshot().set_child_deleted(collection, id, deleted)
    }

    /// Merge the reply in patch mode, collections included where the entity
    /// owns any, then let the registry finish its bookkeeping.
    fn apply_commit(&self, response: EntityPayload, change_set: &ChangeSet) -> ChangeResult<MergeReport> {
        let found = response.kind();
        let payload = S::payload(response).map_err(|_| ChangeError::WrongKind {
            expected: S::KIND,
            found,
        })?;

        let report = S::apply_reply(self, payload, change_set);

        if let Some(registry) = self.registry() {
            registry.committed(S::KIND, self.id, self.owner_guild(), change_set);
        }
        Ok(report)
    }
}
