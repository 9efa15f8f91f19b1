use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use snow_types::{ChangeSet, EntityKind, EntityPayload, ReactionEmoji, Snowflake, UserPayload};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::traits::{ReactorQuery, Transport};

/// In-memory transport for tests, local demos, and embedding.
///
/// Fetches are served from a map of payloads. Commits consume scripted
/// replies in order; with no reply queued a commit fails with a remote error.
/// Every commit is recorded, successful or not.
#[derive(Default)]
pub struct ScriptedTransport {
    inner: RwLock<ScriptState>,
    committed: Mutex<Vec<ChangeSet>>,
    fetch_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    reactor_calls: AtomicUsize,
}

#[derive(Default)]
struct ScriptState {
    entities: HashMap<(EntityKind, Snowflake), EntityPayload>,
    reactors: HashMap<(Snowflake, ReactionEmoji), Vec<UserPayload>>,
    commit_replies: VecDeque<TransportResult<EntityPayload>>,
    fetch_failures: VecDeque<TransportError>,
    fetch_delay: Option<Duration>,
    commit_gate: Option<CommitGate>,
}

/// Holds commits until released. Each release lets one commit through.
#[derive(Clone, Debug)]
pub struct CommitGate(Arc<Semaphore>);

impl CommitGate {
    fn new() -> Self {
        Self(Arc::new(Semaphore::new(0)))
    }

    /// Let `n` waiting or future commits through.
    pub fn release(&self, n: usize) {
        self.0.add_permits(n);
    }

    async fn pass(&self) -> TransportResult<()> {
        let permit = self.0.acquire().await.map_err(|_| TransportError::Disconnected)?;
        permit.forget();
        Ok(())
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::RwLockWriteGuard<'_, ScriptState> {
        self.inner.write().expect("lock poisoned")
    }

    /// Serve `payload` to fetches of its kind and identity.
    pub fn insert(&self, payload: EntityPayload) {
        let key = (payload.kind(), payload.id());
        self.state().entities.insert(key, payload);
    }

    /// Make later fetches of this identity report "not found".
    pub fn remove(&self, kind: EntityKind, id: Snowflake) -> Option<EntityPayload> {
        self.state().entities.remove(&(kind, id))
    }

    /// Queue the reply for the next commit.
    pub fn reply_to_commit(&self, reply: TransportResult<EntityPayload>) {
        self.state().commit_replies.push_back(reply);
    }

    /// Fail the next fetch with `error` instead of serving the map.
    pub fn fail_next_fetch(&self, error: TransportError) {
        self.state().fetch_failures.push_back(error);
    }

    /// Delay every fetch before answering.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state().fetch_delay = delay;
    }

    /// Users served for reactor queries on one message and emoji.
    pub fn set_reactors(&self, message_id: Snowflake, emoji: ReactionEmoji, users: Vec<UserPayload>) {
        self.state().reactors.insert((message_id, emoji), users);
    }

    /// Hold every later commit until the returned gate is released.
    pub fn hold_commits(&self) -> CommitGate {
        let gate = CommitGate::new();
        self.state().commit_gate = Some(gate.clone());
        gate
    }

    /// Every change set seen by `commit`, in arrival order.
    pub fn committed(&self) -> Vec<ChangeSet> {
        self.committed.lock().expect("lock poisoned").clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn commit_calls(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn reactor_calls(&self) -> usize {
        self.reactor_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, kind: EntityKind, id: Snowflake) -> TransportResult<Option<EntityPayload>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.state().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = state.fetch_failures.pop_front() {
            debug!(%kind, %id, %error, "scripted fetch failure");
            return Err(error);
        }
        Ok(state.entities.get(&(kind, id)).cloned())
    }

    async fn commit(&self, change_set: &ChangeSet) -> TransportResult<EntityPayload> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        self.committed
            .lock()
            .expect("lock poisoned")
            .push(change_set.clone());

        let gate = self.state().commit_gate.clone();
        if let Some(gate) = gate {
            gate.pass().await?;
        }

        let reply = self.state().commit_replies.pop_front();
        reply.unwrap_or_else(|| Err(TransportError::remote(500, "no scripted reply")))
    }

    async fn fetch_reactors(&self, query: &ReactorQuery) -> TransportResult<Vec<UserPayload>> {
        self.reactor_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.inner.read().expect("lock poisoned");
        let users = state
            .reactors
            .get(&(query.message_id, query.emoji.clone()))
            .map(|users| {
                users
                    .iter()
                    .filter(|u| query.after.map_or(true, |after| u.id > after))
                    .take(query.limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(users)
    }
}
