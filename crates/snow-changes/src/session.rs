use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use snow_merge::MergeReport;
use snow_transport::Transport;
use snow_types::{ChangeSet, ChildEdit, FieldChange, Snowflake};
use tracing::{debug, info, warn};

use crate::config::ChangeConfig;
use crate::error::{ChangeError, ChangeResult};
use crate::guard::{check_entity, check_write};
use crate::trackable::{Scope, Trackable};

/// What a successful [`ChangeSession::apply`] did.
#[derive(Clone, Debug, PartialEq)]
pub enum CommitOutcome {
    /// Nothing differed from the original values; no request was sent.
    NoChanges,
    /// The change set was accepted and the reply merged.
    Applied {
        change_set: ChangeSet,
        report: MergeReport,
    },
}

impl CommitOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Staged writes against one entity.
///
/// Holding a session keeps the entity out of Idle; other sessions on the
/// same entity are refused (or queued) until this one is applied, discarded
/// or dropped. Dropping an unapplied session, including a cancelled
/// [`apply`](Self::apply) future, discards it.
pub struct ChangeSession<T: Trackable> {
    entity: Arc<T>,
    scope: Arc<dyn Scope>,
    fields: Vec<FieldChange>,
    edits: Vec<ChildEdit>,
    timeout: Duration,
    closed: bool,
}

impl<T: Trackable> ChangeSession<T> {
    /// Start staging on `entity`, failing fast if it is not idle.
    pub fn begin(entity: Arc<T>, scope: Arc<dyn Scope>) -> ChangeResult<Self> {
        check_entity(entity.as_ref(), scope.as_ref())?;
        if !entity.tracker().try_begin() {
            return Err(ChangeError::Locked {
                kind: entity.kind(),
                id: entity.id(),
            });
        }
        debug!(kind = %entity.kind(), id = %entity.id(), "changes begun");
        Ok(Self::open(entity, scope))
    }

    /// Start staging on `entity`, waiting for any other session to finish.
    pub async fn begin_queued(entity: Arc<T>, scope: Arc<dyn Scope>) -> ChangeResult<Self> {
        check_entity(entity.as_ref(), scope.as_ref())?;
        entity.tracker().begin_queued().await;
        let session = Self::open(entity, scope);
        // The entity may have been deleted while we waited.
        check_entity(session.entity.as_ref(), session.scope.as_ref())?;
        debug!(kind = %session.entity.kind(), id = %session.entity.id(), "queued changes begun");
        Ok(session)
    }

    fn open(entity: Arc<T>, scope: Arc<dyn Scope>) -> Self {
        Self {
            entity,
            scope,
            fields: Vec::new(),
            edits: Vec::new(),
            timeout: ChangeConfig::default().commit_timeout(),
            closed: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn entity(&self) -> &Arc<T> {
        &self.entity
    }

    /// Stage a write. Overwrites an earlier staged write to the same field
    /// but keeps the value seen by the first one as the original.
    pub fn stage(&mut self, field: &str, value: impl Serialize) -> ChangeResult<()> {
        let current = self.known_field(field)?;
        check_write(self.entity.as_ref(), self.scope.as_ref(), field)?;
        let new = serde_json::to_value(value).map_err(|e| ChangeError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        })?;

        match self.fields.iter_mut().find(|c| c.field == field) {
            Some(change) => change.new = new,
            None => self.fields.push(FieldChange {
                field: field.to_string(),
                original: current,
                new,
            }),
        }
        Ok(())
    }

    /// The staged value of `field`, or its cached value if nothing is staged.
    pub fn value(&self, field: &str) -> Option<Value> {
        self.fields
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.new.clone())
            .or_else(|| self.entity.field_value(field))
    }

    /// Stage creating a child in an owned collection.
    pub fn add_child(&mut self, collection: &str, value: impl Serialize) -> ChangeResult<()> {
        self.known_field(collection)?;
        check_write(self.entity.as_ref(), self.scope.as_ref(), collection)?;
        let value = serde_json::to_value(value).map_err(|e| ChangeError::InvalidValue {
            field: collection.to_string(),
            reason: e.to_string(),
        })?;
        self.edits.push(ChildEdit::Add {
            collection: collection.to_string(),
            value,
        });
        Ok(())
    }

    /// Stage removing a child from an owned collection.
    ///
    /// The child reads as deleted immediately. It leaves the collection only
    /// once the commit succeeds; if the commit fails or the session is
    /// dropped, the flag is cleared again.
    pub fn remove_child(&mut self, collection: &str, id: Snowflake) -> ChangeResult<()> {
        self.known_field(collection)?;
        check_write(self.entity.as_ref(), self.scope.as_ref(), collection)?;
        if self.removes(collection, id) {
            return Ok(());
        }
        if !self.entity.set_child_deleted(collection, id, true) {
            return Err(ChangeError::UnknownChild {
                collection: collection.to_string(),
                id,
            });
        }
        self.edits.push(ChildEdit::Remove {
            collection: collection.to_string(),
            id,
        });
        Ok(())
    }

    fn removes(&self, collection: &str, id: Snowflake) -> bool {
        self.edits.iter().any(|edit| {
            matches!(edit, ChildEdit::Remove { collection: c, id: i } if c == collection && *i == id)
        })
    }

    fn known_field(&self, field: &str) -> ChangeResult<Value> {
        self.entity
            .field_value(field)
            .ok_or_else(|| ChangeError::UnknownField {
                kind: self.entity.kind(),
                field: field.to_string(),
            })
    }

    /// The change set `apply` would send: staged fields whose value differs
    /// from the original, plus every child edit.
    pub fn change_set(&self, reason: Option<String>) -> ChangeSet {
        let mut set = ChangeSet::new(self.entity.kind(), self.entity.id());
        set.reason = reason;
        set.fields = self
            .fields
            .iter()
            .filter(|c| c.original != c.new)
            .cloned()
            .collect();
        set.edits = self.edits.clone();
        set
    }

    pub fn has_changes(&self) -> bool {
        !self.change_set(None).is_empty()
    }

    /// Send the staged changes as one change set and merge the reply.
    ///
    /// On any failure nothing staged becomes visible and removed children
    /// are restored.
    pub async fn apply(mut self, transport: &dyn Transport, reason: Option<String>) -> ChangeResult<CommitOutcome> {
        let set = self.change_set(reason);
        if set.is_empty() {
            debug!(kind = %set.kind, id = %set.target, "nothing to commit");
            self.close(false);
            return Ok(CommitOutcome::NoChanges);
        }
        if let Err(error) = check_entity(self.entity.as_ref(), self.scope.as_ref()) {
            self.close(false);
            return Err(error);
        }
        if !self.entity.tracker().start_commit() {
            self.close(false);
            return Err(ChangeError::Locked {
                kind: set.kind,
                id: set.target,
            });
        }

        info!(
            change_set = %set.id.short_id(),
            kind = %set.kind,
            id = %set.target,
            fields = ?set.field_names(),
            edits = set.edits.len(),
            "committing change set"
        );

        let reply = tokio::time::timeout(self.timeout, transport.commit(&set)).await;
        match reply {
            Ok(Ok(response)) => match self.entity.apply_commit(response, &set) {
                Ok(report) => {
                    self.close(true);
                    info!(change_set = %set.id.short_id(), merged = ?report.changed, "change set applied");
                    Ok(CommitOutcome::Applied {
                        change_set: set,
                        report,
                    })
                }
                Err(error) => {
                    warn!(change_set = %set.id.short_id(), %error, "commit reply rejected");
                    self.close(false);
                    Err(error)
                }
            },
            Ok(Err(error)) => {
                warn!(change_set = %set.id.short_id(), %error, "commit failed");
                self.close(false);
                Err(ChangeError::Remote(error))
            }
            Err(_) => {
                warn!(change_set = %set.id.short_id(), after = ?self.timeout, "commit timed out");
                self.close(false);
                Err(ChangeError::Timeout { after: self.timeout })
            }
        }
    }

    /// Drop every staged change and return the entity to Idle.
    pub fn discard(mut self) {
        self.close(false);
    }

    fn close(&mut self, committed: bool) {
        if self.closed {
            return;
        }
        self.closed = true;
        if !committed {
            for edit in &self.edits {
                if let ChildEdit::Remove { collection, id } = edit {
                    self.entity.set_child_deleted(collection, *id, false);
                }
            }
        }
        self.entity.tracker().release();
    }
}

impl<T: Trackable> Drop for ChangeSession<T> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(kind = %self.entity.kind(), id = %self.entity.id(), "changes abandoned");
            self.close(false);
        }
    }
}

/// Write one directly-writable field without an explicit begin.
///
/// Runs the same guards and the same single-request commit as a session.
/// Fields not listed in [`ChangeConfig::direct_fields`] fail with
/// [`ChangeError::NotStaging`].
pub async fn write_direct<T: Trackable>(
    entity: Arc<T>,
    scope: Arc<dyn Scope>,
    config: &ChangeConfig,
    transport: &dyn Transport,
    field: &str,
    value: impl Serialize,
) -> ChangeResult<CommitOutcome> {
    if !config.is_direct(entity.kind(), field) {
        return Err(ChangeError::NotStaging {
            field: field.to_string(),
        });
    }
    let mut session = ChangeSession::begin(entity, scope)?.with_timeout(config.commit_timeout());
    session.stage(field, value)?;
    session.apply(transport, None).await
}
