use serde::{Deserialize, Serialize};
use snow_transport::MAX_REACTORS_PER_PAGE;

/// How a repair treats reactors already cached for the emoji.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// The fetched page replaces the cached set.
    #[default]
    Replace,
    /// Replace when the fetch is no larger than the cached set, otherwise
    /// keep cached reactors the fetch did not return.
    MergeWhenLarger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// Upper bound on emoji repaired by one lazy sweep of a message.
    pub max_emoji_per_message: usize,
    /// Reactors fetched per emoji, at most one remote page.
    pub max_users: u8,
    pub policy: RepairPolicy,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            max_emoji_per_message: 20,
            max_users: MAX_REACTORS_PER_PAGE,
            policy: RepairPolicy::Replace,
        }
    }
}
