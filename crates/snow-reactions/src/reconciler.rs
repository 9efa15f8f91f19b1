//! Reaction repair.
//!
//! The event stream guarantees raw counts but not who reacted, so the
//! reverse indices fall behind. A repair downloads one page of reactors for
//! an emoji and installs it as the emoji's reactor set; the raw count becomes
//! the page length.

use std::sync::Arc;

use snow_transport::{ReactorQuery, Transport};
use snow_types::{ReactionEmoji, Snowflake, UserPayload};
use tracing::{debug, info, warn};

use crate::config::ReactionConfig;
use crate::error::ReactionResult;
use crate::message::Message;

/// Result of repairing one emoji.
#[derive(Clone, Debug, PartialEq)]
pub struct Repaired {
    pub message_id: Snowflake,
    pub emoji: ReactionEmoji,
    /// Known reactors before and after the repair.
    pub before: usize,
    pub after: usize,
    /// The raw count after the repair.
    pub count: u32,
    /// The fetched users, for the caller to merge into its user cache.
    pub users: Vec<UserPayload>,
}

pub struct ReactionReconciler {
    transport: Arc<dyn Transport>,
    config: ReactionConfig,
}

impl ReactionReconciler {
    pub fn new(transport: Arc<dyn Transport>, config: ReactionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    /// Fetch up to `max_users` reactors (clamped to one page) for `emoji` and
    /// install them. On a transport failure nothing changes.
    pub async fn repair(&self, message: &Message, emoji: &ReactionEmoji, max_users: u8) -> ReactionResult<Repaired> {
        let query = ReactorQuery::new(message.channel_id(), message.id(), emoji.clone(), max_users);
        let users = match self.transport.fetch_reactors(&query).await {
            Ok(users) => users,
            Err(error) => {
                warn!(message = %message.id(), %emoji, %error, "reactor fetch failed");
                return Err(error.into());
            }
        };

        let fetched: Vec<Snowflake> = users.iter().map(|u| u.id).collect();
        let (before, after) = message.reactions().repair(emoji, &fetched, self.config.policy);
        let count = message.reactions().snapshot().count(emoji);
        info!(
            message = %message.id(),
            %emoji,
            before,
            after,
            count,
            policy = ?self.config.policy,
            "reactions repaired"
        );
        Ok(Repaired {
            message_id: message.id(),
            emoji: emoji.clone(),
            before,
            after,
            count,
            users,
        })
    }

    /// Repair every desynchronized emoji of `message`, at most
    /// `max_emoji_per_message` of them. Stops at the first transport error.
    pub async fn repair_desynchronized(&self, message: &Message) -> ReactionResult<Vec<Repaired>> {
        let pending = message.reactions().snapshot().desynchronized();
        if pending.len() > self.config.max_emoji_per_message {
            debug!(
                message = %message.id(),
                desynchronized = pending.len(),
                cap = self.config.max_emoji_per_message,
                "repair capped"
            );
        }

        let mut repaired = Vec::new();
        for emoji in pending.iter().take(self.config.max_emoji_per_message) {
            repaired.push(self.repair(message, emoji, self.config.max_users).await?);
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use snow_transport::{ScriptedTransport, TransportError};
    use snow_types::{FieldState, PartialEmoji, ReactionCountPayload, ReactionEvent};

    use super::*;
    use crate::config::RepairPolicy;
    use crate::error::ReactionError;

    const ME: Snowflake = Snowflake::new(900);

    fn users(ids: &[u64]) -> Vec<UserPayload> {
        ids.iter().map(|id| UserPayload::new(Snowflake::new(*id))).collect()
    }

    fn partial(name: &str) -> PartialEmoji {
        PartialEmoji {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn message() -> Message {
        Message::new(Snowflake::new(1), Snowflake::new(2), None, Some(ME))
    }

    fn add(m: &Message, user: u64, name: &str) {
        m.apply_event(&ReactionEvent::Add {
            message_id: m.id(),
            channel_id: m.channel_id(),
            user_id: Snowflake::new(user),
            emoji: partial(name),
        })
        .unwrap();
    }

    fn raw(m: &Message, counts: &[(&str, u32)]) {
        let id = m.id();
        m.merge(snow_types::MessagePayload {
            id,
            channel_id: m.channel_id(),
            guild_id: FieldState::Absent,
            reactions: FieldState::Present(
                counts
                    .iter()
                    .map(|(name, count)| ReactionCountPayload {
                        emoji: partial(name),
                        count: *count,
                        me: false,
                    })
                    .collect(),
            ),
        })
        .unwrap();
    }

    fn reconciler(transport: &Arc<ScriptedTransport>, config: ReactionConfig) -> ReactionReconciler {
        ReactionReconciler::new(Arc::clone(transport) as Arc<dyn Transport>, config)
    }

    #[tokio::test]
    async fn repair_closes_a_desync() {
        let m = message();
        add(&m, 1, "👍");
        add(&m, 2, "👍");
        raw(&m, &[("👍", 5)]);
        let thumbs = ReactionEmoji::Unicode("👍".into());
        assert!(m.reactions().snapshot().is_desynchronized(&thumbs));

        let transport = Arc::new(ScriptedTransport::new());
        transport.set_reactors(m.id(), thumbs.clone(), users(&[1, 2, 3, 4, 5]));
        let r = reconciler(&transport, ReactionConfig::default());

        let repaired = r.repair(&m, &thumbs, 100).await.unwrap();
        assert_eq!((repaired.before, repaired.after, repaired.count), (2, 5, 5));
        assert_eq!(repaired.users.len(), 5);

        let s = m.reactions().snapshot();
        assert_eq!(s.count(&thumbs), 5);
        assert_eq!(s.reactor_count(&thumbs), 5);
        assert!(!s.reaction(&thumbs).unwrap().me);
        assert!(s.desynchronized().is_empty());
    }

    #[tokio::test]
    async fn page_limit_bounds_the_fetch() {
        let m = message();
        raw(&m, &[("a", 4)]);
        let a = ReactionEmoji::Unicode("a".into());

        let transport = Arc::new(ScriptedTransport::new());
        transport.set_reactors(m.id(), a.clone(), users(&[1, 2, 3, 900]));
        let r = reconciler(&transport, ReactionConfig::default());

        let repaired = r.repair(&m, &a, 2).await.unwrap();
        assert_eq!(repaired.count, 2);
        assert!(!m.reactions().snapshot().is_desynchronized(&a));
    }

    #[tokio::test]
    async fn self_flag_follows_fetched_membership() {
        let m = message();
        raw(&m, &[("a", 2)]);
        let a = ReactionEmoji::Unicode("a".into());

        let transport = Arc::new(ScriptedTransport::new());
        transport.set_reactors(m.id(), a.clone(), users(&[5, 900]));
        reconciler(&transport, ReactionConfig::default())
            .repair(&m, &a, 100)
            .await
            .unwrap();
        assert!(m.reactions().snapshot().reaction(&a).unwrap().me);
    }

    #[tokio::test]
    async fn sweep_is_capped_per_message() {
        let m = message();
        let counts: Vec<(String, u32)> = (0..25).map(|i| (format!("e{i}"), 1)).collect();
        let refs: Vec<(&str, u32)> = counts.iter().map(|(n, c)| (n.as_str(), *c)).collect();
        raw(&m, &refs);
        assert_eq!(m.reactions().snapshot().desynchronized().len(), 25);

        let transport = Arc::new(ScriptedTransport::new());
        let r = reconciler(&transport, ReactionConfig::default());
        let repaired = r.repair_desynchronized(&m).await.unwrap();

        assert_eq!(repaired.len(), 20);
        assert_eq!(transport.reactor_calls(), 20);
        // Nobody came back, so each repaired counter is gone.
        assert_eq!(m.reactions().snapshot().desynchronized().len(), 5);
    }

    #[tokio::test]
    async fn merge_policy_keeps_unreturned_reactors() {
        let m = message();
        add(&m, 9, "a");
        let a = ReactionEmoji::Unicode("a".into());

        let transport = Arc::new(ScriptedTransport::new());
        transport.set_reactors(m.id(), a.clone(), users(&[1, 2]));
        let config = ReactionConfig {
            policy: RepairPolicy::MergeWhenLarger,
            ..ReactionConfig::default()
        };
        let repaired = reconciler(&transport, config).repair(&m, &a, 100).await.unwrap();
        assert_eq!(repaired.after, 3);
        assert_eq!(repaired.count, 2);
    }

    #[tokio::test]
    async fn transport_failure_changes_nothing() {
        struct Down;

        #[async_trait::async_trait]
        impl Transport for Down {
            async fn fetch(
                &self,
                _kind: snow_types::EntityKind,
                _id: Snowflake,
            ) -> snow_transport::TransportResult<Option<snow_types::EntityPayload>> {
                Err(TransportError::Disconnected)
            }

            async fn commit(
                &self,
                _change_set: &snow_types::ChangeSet,
            ) -> snow_transport::TransportResult<snow_types::EntityPayload> {
                Err(TransportError::Disconnected)
            }

            async fn fetch_reactors(&self, _query: &ReactorQuery) -> snow_transport::TransportResult<Vec<UserPayload>> {
                Err(TransportError::Disconnected)
            }
        }

        let m = message();
        add(&m, 1, "a");
        raw(&m, &[("a", 3)]);
        let before = m.reactions().snapshot();

        let r = ReactionReconciler::new(Arc::new(Down), ReactionConfig::default());
        let a = ReactionEmoji::Unicode("a".into());
        assert_eq!(
            r.repair(&m, &a, 100).await,
            Err(ReactionError::Remote(TransportError::Disconnected))
        );
        assert_eq!(*m.reactions().snapshot(), *before);
    }
}
