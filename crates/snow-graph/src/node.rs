use snow_types::{ChannelKind, Snowflake};

/// What the channel rebuilder needs to know about a channel.
///
/// Implementations must tolerate partially populated entities: a channel
/// known only by identity reports [`ChannelKind::Unknown`], no parent and
/// position 0.
pub trait ChannelNode {
    fn id(&self) -> Snowflake;
    fn kind(&self) -> ChannelKind;
    fn parent_id(&self) -> Option<Snowflake>;
    fn position(&self) -> i32;

    /// All layout attributes read at once. Override when the attributes come
    /// from one snapshot so a rebuild never mixes two versions of a channel.
    fn layout(&self) -> ChannelLayout {
        ChannelLayout {
            id: self.id(),
            kind: self.kind(),
            parent_id: self.parent_id(),
            position: self.position(),
        }
    }
}

/// The layout attributes of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelLayout {
    pub id: Snowflake,
    pub kind: ChannelKind,
    pub parent_id: Option<Snowflake>,
    pub position: i32,
}

/// What the voice rebuilder needs to know about a voice state.
pub trait VoiceNode {
    fn user_id(&self) -> Snowflake;
    /// `None` when the user is not connected to any channel.
    fn channel_id(&self) -> Option<Snowflake>;
}
