use std::time::Duration;

use serde::{Deserialize, Serialize};
use snow_changes::ChangeConfig;
use snow_reactions::ReactionConfig;
use snow_types::Snowflake;

use crate::error::{ClientError, ClientResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// The local user: actor for permission checks and the reaction `me` flag.
    pub self_id: Option<Snowflake>,
    pub changes: ChangeConfig,
    pub reactions: ReactionConfig,
    /// Upper bound for one download, in milliseconds.
    pub fetch_timeout_ms: u64,
    /// Buffered cache events per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            self_id: None,
            changes: ChangeConfig::default(),
            reactions: ReactionConfig::default(),
            fetch_timeout_ms: 30_000,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        toml::from_str(source).map_err(|e| ClientError::Config(e.to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_self_id(mut self, id: Snowflake) -> Self {
        self.self_id = Some(id);
        self
    }
}
