use snow_graph::VoiceNode;
use snow_merge::{merge_option, merge_value, Merge, MergeMode, MergeReport};
use snow_types::{Snowflake, VoiceStatePayload};

/// A user's voice connection inside a guild. Owned by the guild; not an
/// entity of its own.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VoiceState {
    pub user_id: Snowflake,
    pub channel_id: Option<Snowflake>,
    pub session_id: Option<String>,
    pub deaf: bool,
    pub mute: bool,
    pub self_deaf: bool,
    pub self_mute: bool,
    pub suppress: bool,
}

impl VoiceState {
    pub fn new(user_id: Snowflake) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel_id.is_some()
    }
}

impl Merge<VoiceStatePayload> for VoiceState {
    fn merge(&mut self, p: VoiceStatePayload, mode: MergeMode, report: &mut MergeReport) {
        merge_option("channel_id", &mut self.channel_id, p.channel_id, mode, report);
        merge_option("session_id", &mut self.session_id, p.session_id, mode, report);
        merge_value("deaf", &mut self.deaf, p.deaf, mode, report);
        merge_value("mute", &mut self.mute, p.mute, mode, report);
        merge_value("self_deaf", &mut self.self_deaf, p.self_deaf, mode, report);
        merge_value("self_mute", &mut self.self_mute, p.self_mute, mode, report);
        merge_value("suppress", &mut self.suppress, p.suppress, mode, report);
    }
}

impl VoiceNode for VoiceState {
    fn user_id(&self) -> Snowflake {
        self.user_id
    }

    fn channel_id(&self) -> Option<Snowflake> {
        self.channel_id
    }
}
