//! Foundation types for Snowcache.
//!
//! Every other Snowcache crate depends on `snow-types`. It defines the cache
//! key, the payload shapes the decoder hands to the core, and the change sets
//! the core hands back to the transport.
//!
//! # Key Types
//!
//! - [`Snowflake`]: Time-ordered 64-bit entity identity
//! - [`FieldState`]: Absent / explicit-null / present payload field
//! - [`EntityKind`], [`ChannelKind`]: Entity and channel discriminants
//! - [`Permissions`]: Capability bits used by write guards
//! - [`EntityPayload`]: Typed snapshot of any cached entity
//! - [`ChangeSet`]: Outbound diff produced by a commit

pub mod change;
pub mod error;
pub mod field;
pub mod identity;
pub mod kind;
pub mod payload;
pub mod permissions;

pub use change::{ChangeSet, ChangeSetId, ChildEdit, FieldChange};
pub use error::TypeError;
pub use field::FieldState;
pub use identity::{Snowflake, PLATFORM_EPOCH_MS};
pub use kind::{ChannelKind, EntityKind};
pub use payload::{
    ChannelPayload, EmojiPayload, EntityPayload, GuildPayload, MemberPayload, MessagePayload,
    PartialEmoji, ReactionCountPayload, ReactionEmoji, ReactionEvent, RolePayload, UserPayload,
    VoiceStatePayload,
};
pub use permissions::Permissions;
