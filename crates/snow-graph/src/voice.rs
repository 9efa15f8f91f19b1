use std::collections::BTreeMap;

use snow_types::Snowflake;

use crate::node::VoiceNode;

/// Voice channel membership derived from a guild's voice states.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceMembership {
    by_channel: BTreeMap<Snowflake, Vec<Snowflake>>,
    by_user: BTreeMap<Snowflake, Snowflake>,
}

impl VoiceMembership {
    /// Build membership from the owned voice-state list. Disconnected states
    /// (no channel) are ignored; if a user appears twice the later state wins.
    pub fn build<V: VoiceNode>(states: &[V]) -> Self {
        let mut by_user = BTreeMap::new();
        for state in states {
            match state.channel_id() {
                Some(channel) => {
                    by_user.insert(state.user_id(), channel);
                }
                None => {
                    by_user.remove(&state.user_id());
                }
            }
        }

        let mut by_channel: BTreeMap<Snowflake, Vec<Snowflake>> = BTreeMap::new();
        for (user, channel) in &by_user {
            by_channel.entry(*channel).or_default().push(*user);
        }

        Self { by_channel, by_user }
    }

    /// Users connected to `channel`, sorted by identity.
    pub fn members_of(&self, channel: Snowflake) -> &[Snowflake] {
        self.by_channel.get(&channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The channel `user` is connected to.
    pub fn channel_of(&self, user: Snowflake) -> Option<Snowflake> {
        self.by_user.get(&user).copied()
    }

    /// Channels with at least one connected user.
    pub fn occupied_channels(&self) -> impl Iterator<Item = Snowflake> + '_ {
        self.by_channel.keys().copied()
    }

    /// Number of connected users.
    pub fn connected(&self) -> usize {
        self.by_user.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct State(u64, Option<u64>);

    impl VoiceNode for State {
        fn user_id(&self) -> Snowflake {
            Snowflake::new(self.0)
        }
        fn channel_id(&self) -> Option<Snowflake> {
            self.1.map(Snowflake::new)
        }
    }

    fn sf(raw: u64) -> Snowflake {
        Snowflake::new(raw)
    }

    #[test]
    fn groups_users_by_channel() {
        let m = VoiceMembership::build(&[State(3, Some(100)), State(1, Some(100)), State(2, Some(200))]);
        assert_eq!(m.members_of(sf(100)), &[sf(1), sf(3)]);
        assert_eq!(m.members_of(sf(200)), &[sf(2)]);
        assert_eq!(m.channel_of(sf(2)), Some(sf(200)));
        assert_eq!(m.connected(), 3);
        assert_eq!(m.occupied_channels().collect::<Vec<_>>(), vec![sf(100), sf(200)]);
    }

    #[test]
    fn disconnected_states_are_ignored() {
        let m = VoiceMembership::build(&[State(1, None), State(2, Some(100))]);
        assert_eq!(m.channel_of(sf(1)), None);
        assert_eq!(m.connected(), 1);
        assert!(m.members_of(sf(999)).is_empty());
    }

    #[test]
    fn later_state_for_same_user_wins() {
        let m = VoiceMembership::build(&[State(1, Some(100)), State(1, Some(200))]);
        assert!(m.members_of(sf(100)).is_empty());
        assert_eq!(m.members_of(sf(200)), &[sf(1)]);

        let m = VoiceMembership::build(&[State(1, Some(100)), State(1, None)]);
        assert_eq!(m.connected(), 0);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let states = [State(5, Some(1)), State(4, Some(2)), State(3, Some(1))];
        assert_eq!(VoiceMembership::build(&states), VoiceMembership::build(&states));
    }
}
