use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use snow_types::{FieldState, ReactionCountPayload, ReactionEmoji, ReactionEvent, Snowflake};
use tracing::{debug, trace};

use crate::config::RepairPolicy;
use crate::error::{ReactionError, ReactionResult};

/// Raw counter for one emoji, as the remote service reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: ReactionEmoji,
    pub count: u32,
    /// The local user is among the reactors.
    pub me: bool,
}

/// One message's reactions: raw counters plus the two reverse indices.
///
/// `by_user` is always the exact inverse of `by_emoji`. The raw counters and
/// the indices are independent sources and may disagree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReactionState {
    raw: Vec<Reaction>,
    by_emoji: BTreeMap<ReactionEmoji, BTreeSet<Snowflake>>,
    by_user: BTreeMap<Snowflake, BTreeSet<ReactionEmoji>>,
}

impl ReactionState {
    /// Raw counters in the order the remote service listed them.
    pub fn raw(&self) -> &[Reaction] {
        &self.raw
    }

    pub fn reaction(&self, emoji: &ReactionEmoji) -> Option<&Reaction> {
        self.raw.iter().find(|r| &r.emoji == emoji)
    }

    /// Raw count for `emoji`; zero when no counter exists.
    pub fn count(&self, emoji: &ReactionEmoji) -> u32 {
        self.reaction(emoji).map_or(0, |r| r.count)
    }

    /// Known reactors for `emoji`, ascending.
    pub fn reactors(&self, emoji: &ReactionEmoji) -> impl Iterator<Item = Snowflake> + '_ {
        self.by_emoji.get(emoji).into_iter().flatten().copied()
    }

    pub fn reactor_count(&self, emoji: &ReactionEmoji) -> usize {
        self.by_emoji.get(emoji).map_or(0, BTreeSet::len)
    }

    /// Emoji `user` is known to have reacted with.
    pub fn emoji_of(&self, user: Snowflake) -> impl Iterator<Item = &ReactionEmoji> + '_ {
        self.by_user.get(&user).into_iter().flatten()
    }

    pub fn has_reacted(&self, user: Snowflake, emoji: &ReactionEmoji) -> bool {
        self.by_emoji.get(emoji).is_some_and(|set| set.contains(&user))
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty() && self.by_emoji.is_empty()
    }

    /// The raw count and the known reactors disagree. A missing counter and
    /// a missing or empty reactor set count as agreeing.
    pub fn is_desynchronized(&self, emoji: &ReactionEmoji) -> bool {
        self.count(emoji) as usize != self.reactor_count(emoji)
    }

    /// Every desynchronized emoji: counters first, in raw order, then emoji
    /// only the indices know about.
    pub fn desynchronized(&self) -> Vec<ReactionEmoji> {
        let mut out: Vec<ReactionEmoji> = self
            .raw
            .iter()
            .map(|r| &r.emoji)
            .filter(|emoji| self.is_desynchronized(emoji))
            .cloned()
            .collect();
        for emoji in self.by_emoji.keys() {
            if self.reaction(emoji).is_none() && self.is_desynchronized(emoji) {
                out.push(emoji.clone());
            }
        }
        out
    }

    fn raw_mut(&mut self, emoji: &ReactionEmoji) -> &mut Reaction {
        let index = match self.raw.iter().position(|r| &r.emoji == emoji) {
            Some(index) => index,
            None => {
                self.raw.push(Reaction {
                    emoji: emoji.clone(),
                    count: 0,
                    me: false,
                });
                self.raw.len() - 1
            }
        };
        &mut self.raw[index]
    }

    fn drop_empty_counter(&mut self, emoji: &ReactionEmoji) {
        self.raw.retain(|r| &r.emoji != emoji || r.count > 0);
    }

    fn add_reactor(&mut self, emoji: &ReactionEmoji, user: Snowflake) -> bool {
        let inserted = self.by_emoji.entry(emoji.clone()).or_default().insert(user);
        if inserted {
            self.by_user.entry(user).or_default().insert(emoji.clone());
        }
        inserted
    }

    fn remove_reactor(&mut self, emoji: &ReactionEmoji, user: Snowflake) -> bool {
        let Some(set) = self.by_emoji.get_mut(emoji) else {
            return false;
        };
        if !set.remove(&user) {
            return false;
        }
        if set.is_empty() {
            self.by_emoji.remove(emoji);
        }
        if let Some(emoji_set) = self.by_user.get_mut(&user) {
            emoji_set.remove(emoji);
            if emoji_set.is_empty() {
                self.by_user.remove(&user);
            }
        }
        true
    }

    fn drop_emoji(&mut self, emoji: &ReactionEmoji) {
        if let Some(users) = self.by_emoji.remove(emoji) {
            for user in users {
                if let Some(emoji_set) = self.by_user.get_mut(&user) {
                    emoji_set.remove(emoji);
                    if emoji_set.is_empty() {
                        self.by_user.remove(&user);
                    }
                }
            }
        }
        self.raw.retain(|r| &r.emoji != emoji);
    }

    fn set_reactors(&mut self, emoji: &ReactionEmoji, next: BTreeSet<Snowflake>) {
        let current: Vec<Snowflake> = self.reactors(emoji).collect();
        for user in current {
            if !next.contains(&user) {
                self.remove_reactor(emoji, user);
            }
        }
        for user in next {
            self.add_reactor(emoji, user);
        }
    }
}

/// Thread-safe holder of a [`ReactionState`].
///
/// Readers take a snapshot; writers are serialized and publish a new one.
pub struct ReactionContainer {
    self_id: Option<Snowflake>,
    state: ArcSwap<ReactionState>,
    write: Mutex<()>,
}

impl ReactionContainer {
    /// `self_id` is the local user, used for the `me` flag.
    pub fn new(self_id: Option<Snowflake>) -> Self {
        Self {
            self_id,
            state: ArcSwap::from_pointee(ReactionState::default()),
            write: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<ReactionState> {
        self.state.load_full()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ReactionState) -> R) -> R {
        let _guard = self.write.lock().expect("lock poisoned");
        let mut next = ReactionState::clone(&self.state.load());
        let result = f(&mut next);
        self.state.store(Arc::new(next));
        result
    }

    fn is_self(&self, user: Snowflake) -> bool {
        self.self_id == Some(user)
    }

    /// Apply one reaction event. Returns whether anything changed.
    pub fn apply_event(&self, event: &ReactionEvent) -> ReactionResult<bool> {
        match event {
            ReactionEvent::Add { user_id, emoji, .. } => {
                let emoji = emoji.key().ok_or(ReactionError::InvalidEmoji)?;
                Ok(self.add(&emoji, *user_id))
            }
            ReactionEvent::Remove { user_id, emoji, .. } => {
                let emoji = emoji.key().ok_or(ReactionError::InvalidEmoji)?;
                Ok(self.remove(&emoji, *user_id))
            }
            ReactionEvent::RemoveAll { .. } => Ok(self.mutate(|state| {
                let changed = !state.is_empty();
                *state = ReactionState::default();
                changed
            })),
            ReactionEvent::RemoveEmoji { emoji, .. } => {
                let emoji = emoji.key().ok_or(ReactionError::InvalidEmoji)?;
                Ok(self.mutate(|state| {
                    let changed = state.reaction(&emoji).is_some() || state.by_emoji.contains_key(&emoji);
                    state.drop_emoji(&emoji);
                    changed
                }))
            }
        }
    }

    fn add(&self, emoji: &ReactionEmoji, user: Snowflake) -> bool {
        let me = self.is_self(user);
        self.mutate(|state| {
            if !state.add_reactor(emoji, user) {
                return false;
            }
            let counter = state.raw_mut(emoji);
            counter.count += 1;
            counter.me |= me;
            true
        })
    }

    /// A removal for an unknown user still lowers the counter when the
    /// counter is already ahead of the known reactors.
    fn remove(&self, emoji: &ReactionEmoji, user: Snowflake) -> bool {
        let me = self.is_self(user);
        self.mutate(|state| {
            let known = state.remove_reactor(emoji, user);
            let ahead = state.count(emoji) as usize > state.reactor_count(emoji);
            if !known && !ahead {
                return false;
            }
            if let Some(counter) = state.raw.iter_mut().find(|r| &r.emoji == emoji) {
                counter.count = counter.count.saturating_sub(1);
                if me {
                    counter.me = false;
                }
            }
            state.drop_empty_counter(emoji);
            true
        })
    }

    /// Replace the raw counters from a message payload. Reactor sets of
    /// emoji that no longer have a counter are dropped; the rest are kept
    /// and may now disagree with their counter.
    pub fn replace_raw(&self, reactions: FieldState<Vec<ReactionCountPayload>>) -> bool {
        let incoming = match reactions {
            FieldState::Absent => return false,
            FieldState::Null => Vec::new(),
            FieldState::Present(items) => items,
        };

        let mut raw: Vec<Reaction> = Vec::with_capacity(incoming.len());
        for item in incoming {
            let Some(emoji) = item.emoji.key() else {
                debug!("reaction counter without emoji identity skipped");
                continue;
            };
            match raw.iter_mut().find(|r| r.emoji == emoji) {
                Some(existing) => {
                    existing.count = item.count;
                    existing.me = item.me;
                }
                None => raw.push(Reaction {
                    emoji,
                    count: item.count,
                    me: item.me,
                }),
            }
        }
        raw.retain(|r| r.count > 0);

        self.mutate(|state| {
            if state.raw == raw {
                return false;
            }
            let stale: Vec<ReactionEmoji> = state
                .by_emoji
                .keys()
                .filter(|emoji| !raw.iter().any(|r| &r.emoji == *emoji))
                .cloned()
                .collect();
            for emoji in &stale {
                state.drop_emoji(emoji);
            }
            state.raw = raw;
            trace!(emoji = state.raw.len(), "reaction counters replaced");
            true
        })
    }

    /// Install a fetched reactor page for `emoji`. The counter becomes the
    /// number of distinct fetched users. Returns the reactor set size before and after.
    pub(crate) fn repair(&self, emoji: &ReactionEmoji, fetched: &[Snowflake], policy: RepairPolicy) -> (usize, usize) {
        let self_id = self.self_id;
        self.mutate(|state| {
            let before = state.reactor_count(emoji);
            let mut next: BTreeSet<Snowflake> = fetched.iter().copied().collect();
            // A page may list a user twice; the count follows distinct users.
            let count = u32::try_from(next.len()).unwrap_or(u32::MAX);
            if policy == RepairPolicy::MergeWhenLarger && next.len() > before {
                next.extend(state.reactors(emoji));
            }
            let me = self_id.is_some_and(|id| next.contains(&id));
            state.set_reactors(emoji, next);

            let counter = state.raw_mut(emoji);
            counter.count = count;
            counter.me = me;
            state.drop_empty_counter(emoji);
            (before, state.reactor_count(emoji))
        })
    }
}

impl Default for ReactionContainer {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use snow_types::PartialEmoji;

    use super::*;

    const ME: Snowflake = Snowflake::new(900);

    fn unicode(name: &str) -> ReactionEmoji {
        ReactionEmoji::Unicode(name.into())
    }

    fn partial(name: &str) -> PartialEmoji {
        PartialEmoji {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn add(user: u64, name: &str) -> ReactionEvent {
        ReactionEvent::Add {
            message_id: Snowflake::new(1),
            channel_id: Snowflake::new(2),
            user_id: Snowflake::new(user),
            emoji: partial(name),
        }
    }

    fn remove(user: u64, name: &str) -> ReactionEvent {
        ReactionEvent::Remove {
            message_id: Snowflake::new(1),
            channel_id: Snowflake::new(2),
            user_id: Snowflake::new(user),
            emoji: partial(name),
        }
    }

    fn counter(name: &str, count: u32) -> ReactionCountPayload {
        ReactionCountPayload {
            emoji: partial(name),
            count,
            me: false,
        }
    }

    fn assert_inverse(state: &ReactionState) {
        for (emoji, users) in &state.by_emoji {
            assert!(!users.is_empty());
            for user in users {
                assert!(state.by_user[user].contains(emoji));
            }
        }
        for (user, emoji_set) in &state.by_user {
            assert!(!emoji_set.is_empty());
            for emoji in emoji_set {
                assert!(state.by_emoji[emoji].contains(user));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    #[test]
    fn add_and_remove_keep_counter_in_step() {
        let c = ReactionContainer::new(Some(ME));
        assert!(c.apply_event(&add(1, "👍")).unwrap());
        assert!(c.apply_event(&add(900, "👍")).unwrap());
        assert!(!c.apply_event(&add(1, "👍")).unwrap());

        let s = c.snapshot();
        let thumbs = unicode("👍");
        assert_eq!(s.count(&thumbs), 2);
        assert!(s.reaction(&thumbs).unwrap().me);
        assert!(s.desynchronized().is_empty());

        c.apply_event(&remove(900, "👍")).unwrap();
        let s = c.snapshot();
        assert_eq!(s.count(&thumbs), 1);
        assert!(!s.reaction(&thumbs).unwrap().me);

        c.apply_event(&remove(1, "👍")).unwrap();
        assert!(c.snapshot().is_empty());
    }

    #[test]
    fn remove_of_unknown_user_lowers_a_leading_counter() {
        let c = ReactionContainer::default();
        c.replace_raw(FieldState::Present(vec![counter("🔥", 3)]));
        c.apply_event(&add(1, "🔥")).unwrap();
        assert_eq!(c.snapshot().count(&unicode("🔥")), 4);

        assert!(c.apply_event(&remove(7, "🔥")).unwrap());
        assert_eq!(c.snapshot().count(&unicode("🔥")), 3);

        // In step: an unknown removal is a duplicate and is ignored.
        let c = ReactionContainer::default();
        c.apply_event(&add(1, "🔥")).unwrap();
        assert!(!c.apply_event(&remove(7, "🔥")).unwrap());
        assert_eq!(c.snapshot().count(&unicode("🔥")), 1);
    }

    #[test]
    fn remove_emoji_and_remove_all() {
        let c = ReactionContainer::default();
        c.apply_event(&add(1, "a")).unwrap();
        c.apply_event(&add(1, "b")).unwrap();
        c.apply_event(&add(2, "b")).unwrap();

        c.apply_event(&ReactionEvent::RemoveEmoji {
            message_id: Snowflake::new(1),
            channel_id: Snowflake::new(2),
            emoji: partial("b"),
        })
        .unwrap();
        let s = c.snapshot();
        assert_eq!(s.reactor_count(&unicode("b")), 0);
        assert!(s.reaction(&unicode("b")).is_none());
        assert_eq!(s.emoji_of(Snowflake::new(1)).collect::<Vec<_>>(), vec![&unicode("a")]);
        assert_eq!(s.emoji_of(Snowflake::new(2)).count(), 0);

        assert!(c
            .apply_event(&ReactionEvent::RemoveAll {
                message_id: Snowflake::new(1),
                channel_id: Snowflake::new(2),
            })
            .unwrap());
        assert!(c.snapshot().is_empty());
    }

    #[test]
    fn emoji_without_identity_is_rejected() {
        let c = ReactionContainer::default();
        let event = ReactionEvent::Add {
            message_id: Snowflake::new(1),
            channel_id: Snowflake::new(2),
            user_id: Snowflake::new(3),
            emoji: PartialEmoji::default(),
        };
        assert_eq!(c.apply_event(&event), Err(ReactionError::InvalidEmoji));
    }

    #[test]
    fn custom_emoji_are_keyed_by_id() {
        let c = ReactionContainer::default();
        let renamed = |name: &str| ReactionEvent::Add {
            message_id: Snowflake::new(1),
            channel_id: Snowflake::new(2),
            user_id: Snowflake::new(3),
            emoji: PartialEmoji {
                id: Some(Snowflake::new(55)),
                name: Some(name.into()),
                animated: false,
            },
        };
        c.apply_event(&renamed("party")).unwrap();
        assert!(!c.apply_event(&renamed("party_v2")).unwrap());
        assert_eq!(c.snapshot().count(&ReactionEmoji::Custom(Snowflake::new(55))), 1);
    }

    // -----------------------------------------------------------------------
    // Raw counters and desync
    // -----------------------------------------------------------------------

    #[test]
    fn raw_counters_drift_from_reactors() {
        let c = ReactionContainer::default();
        c.apply_event(&add(1, "a")).unwrap();
        c.apply_event(&add(2, "a")).unwrap();
        c.apply_event(&add(1, "gone")).unwrap();

        assert!(c.replace_raw(FieldState::Present(vec![counter("a", 5), counter("new", 1)])));
        let s = c.snapshot();
        assert!(s.is_desynchronized(&unicode("a")));
        assert!(s.is_desynchronized(&unicode("new")));
        assert_eq!(s.reactor_count(&unicode("gone")), 0);
        assert_eq!(s.desynchronized(), vec![unicode("a"), unicode("new")]);
        assert_inverse(&s);
    }

    #[test]
    fn absent_and_empty_are_in_sync() {
        let c = ReactionContainer::default();
        let s = c.snapshot();
        assert!(!s.is_desynchronized(&unicode("a")));

        assert!(!c.replace_raw(FieldState::Absent));
        c.replace_raw(FieldState::Present(vec![counter("a", 0)]));
        assert!(c.snapshot().desynchronized().is_empty());
    }

    #[test]
    fn null_reactions_clear_everything() {
        let c = ReactionContainer::default();
        c.apply_event(&add(1, "a")).unwrap();
        assert!(c.replace_raw(FieldState::Null));
        assert!(c.snapshot().is_empty());
    }

    // -----------------------------------------------------------------------
    // Repair
    // -----------------------------------------------------------------------

    fn ids(raw: &[u64]) -> Vec<Snowflake> {
        raw.iter().map(|id| Snowflake::new(*id)).collect()
    }

    #[test]
    fn repair_replaces_with_fetched_page() {
        let c = ReactionContainer::new(Some(ME));
        c.apply_event(&add(1, "a")).unwrap();
        c.apply_event(&add(2, "a")).unwrap();
        c.replace_raw(FieldState::Present(vec![counter("a", 5)]));

        let (before, after) = c.repair(&unicode("a"), &ids(&[1, 2, 3, 4, 900]), RepairPolicy::Replace);
        assert_eq!((before, after), (2, 5));
        let s = c.snapshot();
        assert_eq!(s.count(&unicode("a")), 5);
        assert!(s.reaction(&unicode("a")).unwrap().me);
        assert!(!s.is_desynchronized(&unicode("a")));
        assert_inverse(&s);
    }

    #[test]
    fn smaller_fetch_discards_stale_reactors() {
        let c = ReactionContainer::default();
        for user in 1..=4 {
            c.apply_event(&add(user, "a")).unwrap();
        }
        let (before, after) = c.repair(&unicode("a"), &ids(&[2, 3]), RepairPolicy::MergeWhenLarger);
        assert_eq!((before, after), (4, 2));
        assert_eq!(c.snapshot().emoji_of(Snowflake::new(1)).count(), 0);
    }

    #[test]
    fn larger_fetch_merges_under_merge_policy() {
        let c = ReactionContainer::default();
        c.apply_event(&add(9, "a")).unwrap();
        let (_, after) = c.repair(&unicode("a"), &ids(&[1, 2]), RepairPolicy::MergeWhenLarger);
        assert_eq!(after, 3);
        let s = c.snapshot();
        assert_eq!(s.count(&unicode("a")), 2);
        assert!(s.has_reacted(Snowflake::new(9), &unicode("a")));
        assert!(s.is_desynchronized(&unicode("a")));
    }

    #[test]
    fn duplicate_reactors_count_once() {
        let c = ReactionContainer::new(Some(ME));
        c.replace_raw(FieldState::Present(vec![counter("a", 3)]));

        let (_, after) = c.repair(&unicode("a"), &ids(&[1, 2, 2]), RepairPolicy::Replace);
        assert_eq!(after, 2);
        let s = c.snapshot();
        assert_eq!(s.count(&unicode("a")), 2);
        assert!(!s.is_desynchronized(&unicode("a")));

        c.apply_event(&add(9, "b")).unwrap();
        c.repair(&unicode("b"), &ids(&[4, 4, 5, 5]), RepairPolicy::MergeWhenLarger);
        let s = c.snapshot();
        assert_eq!(s.reactor_count(&unicode("b")), 3);
        assert_eq!(s.count(&unicode("b")), 2);
    }

    #[test]
    fn empty_fetch_drops_the_counter() {
        let c = ReactionContainer::default();
        c.replace_raw(FieldState::Present(vec![counter("a", 2)]));
        c.repair(&unicode("a"), &[], RepairPolicy::Replace);
        assert!(c.snapshot().is_empty());
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Op {
        Add(u64, u8),
        Remove(u64, u8),
        RemoveEmoji(u8),
        Raw(Vec<(u8, u32)>),
        Repair(u8, Vec<u64>),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (1u64..6, 0u8..4).prop_map(|(u, e)| Op::Add(u, e)),
            3 => (1u64..6, 0u8..4).prop_map(|(u, e)| Op::Remove(u, e)),
            1 => (0u8..4).prop_map(Op::RemoveEmoji),
            1 => prop::collection::vec((0u8..4, 0u32..6), 0..4).prop_map(Op::Raw),
            1 => (0u8..4, prop::collection::vec(1u64..6, 0..6)).prop_map(|(e, u)| Op::Repair(e, u)),
        ]
    }

    fn name(e: u8) -> String {
        format!("e{e}")
    }

    proptest! {
        #[test]
        fn indices_stay_inverse(ops in prop::collection::vec(op(), 0..40)) {
            let c = ReactionContainer::new(Some(Snowflake::new(1)));
            for op in ops {
                match op {
                    Op::Add(u, e) => { c.apply_event(&add(u, &name(e))).unwrap(); }
                    Op::Remove(u, e) => { c.apply_event(&remove(u, &name(e))).unwrap(); }
                    Op::RemoveEmoji(e) => {
                        c.apply_event(&ReactionEvent::RemoveEmoji {
                            message_id: Snowflake::new(1),
                            channel_id: Snowflake::new(2),
                            emoji: partial(&name(e)),
                        }).unwrap();
                    }
                    Op::Raw(items) => {
                        c.replace_raw(FieldState::Present(
                            items.into_iter().map(|(e, n)| counter(&name(e), n)).collect(),
                        ));
                    }
                    Op::Repair(e, users) => {
                        c.repair(&unicode(&name(e)), &ids(&users), RepairPolicy::Replace);
                        prop_assert!(!c.snapshot().is_desynchronized(&unicode(&name(e))));
                    }
                }
                assert_inverse(&c.snapshot());
            }
        }
    }
}
