use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::Snowflake;
use crate::kind::EntityKind;

/// Unique identifier for a change set (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetId(uuid::Uuid);

impl ChangeSetId {
    /// Generate a new time-ordered change set ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ChangeSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeSetId({})", self.short_id())
    }
}

impl fmt::Display for ChangeSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One staged scalar change: the value first seen when staging began and the
/// value the caller wants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub original: Value,
    pub new: Value,
}

/// A membership edit on an owned collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChildEdit {
    Add { collection: String, value: Value },
    Remove { collection: String, id: Snowflake },
}

impl ChildEdit {
    pub fn collection(&self) -> &str {
        match self {
            Self::Add { collection, .. } | Self::Remove { collection, .. } => collection,
        }
    }
}

/// The outbound unit of a commit: every effective change staged against one
/// entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: ChangeSetId,
    pub kind: EntityKind,
    pub target: Snowflake,
    pub reason: Option<String>,
    pub fields: Vec<FieldChange>,
    pub edits: Vec<ChildEdit>,
}

impl ChangeSet {
    pub fn new(kind: EntityKind, target: Snowflake) -> Self {
        Self {
            id: ChangeSetId::new(),
            kind,
            target,
            reason: None,
            fields: Vec::new(),
            edits: Vec::new(),
        }
    }

    /// Returns `true` if committing this set would change nothing.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.edits.is_empty()
    }

    /// Names of the changed scalar fields, in staging order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|c| c.field.as_str()).collect()
    }

    /// Identities removed from the given collection.
    pub fn removed(&self, collection: &str) -> Vec<Snowflake> {
        self.edits
            .iter()
            .filter_map(|edit| match edit {
                ChildEdit::Remove { collection: c, id } if c == collection => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Request body: new scalar values keyed by field, plus one object per
    /// edited collection with `add` and `remove` arrays.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        for change in &self.fields {
            body.insert(change.field.clone(), change.new.clone());
        }
        for edit in &self.edits {
            let entry = body
                .entry(edit.collection().to_string())
                .or_insert_with(|| serde_json::json!({ "add": [], "remove": [] }));
            let (slot, value) = match edit {
                ChildEdit::Add { value, .. } => ("add", value.clone()),
                ChildEdit::Remove { id, .. } => ("remove", Value::String(id.to_string())),
            };
            if let Some(Value::Array(items)) = entry.get_mut(slot) {
                items.push(value);
            }
        }
        Value::Object(body)
    }
}
