use serde_json::Value;
use snow_merge::MergeReport;
use snow_types::{ChangeSet, EntityKind, EntityPayload, Permissions, Snowflake};

use crate::error::ChangeResult;
use crate::tracker::ChangeTracker;

/// An entity that can be changed through a [`ChangeSession`](crate::ChangeSession).
///
/// Field names are the payload field names; values are their JSON form, so
/// the diff and the outbound body need no per-type code.
pub trait Trackable: Send + Sync + 'static {
    fn kind(&self) -> EntityKind;
    fn id(&self) -> Snowflake;
    fn tracker(&self) -> &ChangeTracker;
    fn is_deleted(&self) -> bool;
    fn is_field_locked(&self, field: &str) -> bool;

    /// Current authoritative value of a field or owned collection (as a list
    /// of child identities). `None` if the entity has no such field.
    fn field_value(&self, field: &str) -> Option<Value>;

    fn is_read_only(&self, _field: &str) -> bool {
        false
    }

    /// Capabilities `actor` needs to change `field`.
    fn required_permissions(&self, field: &str, actor: Option<Snowflake>) -> Permissions;

    /// Set the `Deleted` flag of an owned child. Returns `false` if the
    /// collection holds no such child.
    fn set_child_deleted(&self, _collection: &str, _id: Snowflake, _deleted: bool) -> bool {
        false
    }

    /// Merge the remote reply to `change_set` in patch mode and splice the
    /// children it removed out of their collections.
    fn apply_commit(&self, response: EntityPayload, change_set: &ChangeSet) -> ChangeResult<MergeReport>;
}

/// Live context a write is checked against: the owning guild's availability
/// and what the acting principal may do there.
pub trait Scope: Send + Sync {
    /// The owning guild, if it is in an outage.
    fn unavailable_guild(&self) -> Option<Snowflake>;

    /// Permissions held by the actor. `None` skips permission checks.
    fn granted(&self) -> Option<Permissions>;

    fn actor(&self) -> Option<Snowflake>;
}

/// No owning guild and no principal: always available, permissions unchecked.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unscoped;

impl Scope for Unscoped {
    fn unavailable_guild(&self) -> Option<Snowflake> {
        None
    }

    fn granted(&self) -> Option<Permissions> {
        None
    }

    fn actor(&self) -> Option<Snowflake> {
        None
    }
}
