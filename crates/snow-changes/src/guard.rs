//! Write guards.
//!
//! Each guard is a pure predicate over a [`WriteAttempt`]: a snapshot of
//! everything a write depends on, captured when the write is made. Guards run
//! in order and the first failure is returned; nothing is staged and no
//! request is sent.

use snow_types::{EntityKind, Permissions, Snowflake};
use tracing::debug;

use crate::error::{ChangeError, ChangeResult};
use crate::trackable::{Scope, Trackable};

/// The state a write is judged against.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteAttempt<'a> {
    pub kind: EntityKind,
    pub id: Snowflake,
    /// Empty for entity-level checks (begin, apply).
    pub field: &'a str,
    pub deleted: bool,
    pub read_only: bool,
    pub field_locked: bool,
    pub unavailable_guild: Option<Snowflake>,
    pub granted: Option<Permissions>,
    pub required: Permissions,
}

impl<'a> WriteAttempt<'a> {
    pub fn capture<T: Trackable + ?Sized>(entity: &T, scope: &dyn Scope, field: &'a str) -> Self {
        let field_level = !field.is_empty();
        Self {
            kind: entity.kind(),
            id: entity.id(),
            field,
            deleted: entity.is_deleted(),
            read_only: field_level && entity.is_read_only(field),
            field_locked: field_level && entity.is_field_locked(field),
            unavailable_guild: scope.unavailable_guild(),
            granted: scope.granted(),
            required: if field_level {
                entity.required_permissions(field, scope.actor())
            } else {
                Permissions::empty()
            },
        }
    }
}

/// One precondition of a write.
pub trait WriteGuard: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, attempt: &WriteAttempt<'_>) -> ChangeResult<()>;
}

pub struct NotDeleted;

impl WriteGuard for NotDeleted {
    fn name(&self) -> &'static str {
        "not_deleted"
    }

    fn check(&self, attempt: &WriteAttempt<'_>) -> ChangeResult<()> {
        if attempt.deleted {
            return Err(ChangeError::Deleted {
                kind: attempt.kind,
                id: attempt.id,
            });
        }
        Ok(())
    }
}

pub struct Available;

impl WriteGuard for Available {
    fn name(&self) -> &'static str {
        "available"
    }

    fn check(&self, attempt: &WriteAttempt<'_>) -> ChangeResult<()> {
        match attempt.unavailable_guild {
            Some(guild) => Err(ChangeError::Unavailable { guild }),
            None => Ok(()),
        }
    }
}

pub struct Writable;

impl WriteGuard for Writable {
    fn name(&self) -> &'static str {
        "writable"
    }

    fn check(&self, attempt: &WriteAttempt<'_>) -> ChangeResult<()> {
        if attempt.read_only {
            return Err(ChangeError::ReadOnly {
                field: attempt.field.to_string(),
            });
        }
        if attempt.field_locked {
            return Err(ChangeError::FieldLocked {
                field: attempt.field.to_string(),
            });
        }
        Ok(())
    }
}

pub struct Permitted;

impl WriteGuard for Permitted {
    fn name(&self) -> &'static str {
        "permitted"
    }

    fn check(&self, attempt: &WriteAttempt<'_>) -> ChangeResult<()> {
        match attempt.granted {
            Some(granted) if !granted.allows(attempt.required) => {
                Err(ChangeError::PermissionDenied {
                    field: attempt.field.to_string(),
                    required: attempt.required,
                })
            }
            _ => Ok(()),
        }
    }
}

static ENTITY_GUARDS: &[&dyn WriteGuard] = &[&NotDeleted, &Available];
static FIELD_GUARDS: &[&dyn WriteGuard] = &[&NotDeleted, &Available, &Writable, &Permitted];

fn run(guards: &[&dyn WriteGuard], attempt: &WriteAttempt<'_>) -> ChangeResult<()> {
    for guard in guards {
        if let Err(error) = guard.check(attempt) {
            debug!(
                guard = guard.name(),
                kind = %attempt.kind,
                id = %attempt.id,
                field = attempt.field,
                %error,
                "write rejected"
            );
            return Err(error);
        }
    }
    Ok(())
}

/// Checks that apply to the entity as a whole (begin, apply).
pub fn check_entity<T: Trackable + ?Sized>(entity: &T, scope: &dyn Scope) -> ChangeResult<()> {
    run(ENTITY_GUARDS, &WriteAttempt::capture(entity, scope, ""))
}

/// Checks for writing one field or editing one owned collection.
pub fn check_write<T: Trackable + ?Sized>(entity: &T, scope: &dyn Scope, field: &str) -> ChangeResult<()> {
    run(FIELD_GUARDS, &WriteAttempt::capture(entity, scope, field))
}
