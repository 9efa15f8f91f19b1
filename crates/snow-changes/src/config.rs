use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use snow_types::EntityKind;

/// Configuration for the unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Maximum wall-clock time for one commit round-trip, in milliseconds.
    pub commit_timeout_ms: u64,
    /// Fields writable without beginning changes, keyed by entity kind name
    /// (`"guild"`, `"member"`, ...).
    pub direct_fields: BTreeMap<String, Vec<String>>,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            commit_timeout_ms: 30_000,
            direct_fields: BTreeMap::new(),
        }
    }
}

impl ChangeConfig {
    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    /// Allow `field` of `kind` to be written directly.
    pub fn allow_direct(mut self, kind: EntityKind, field: impl Into<String>) -> Self {
        self.direct_fields
            .entry(kind.as_str().to_string())
            .or_default()
            .push(field.into());
        self
    }

    pub fn is_direct(&self, kind: EntityKind, field: &str) -> bool {
        self.direct_fields
            .get(kind.as_str())
            .is_some_and(|fields| fields.iter().any(|f| f == field))
    }
}
