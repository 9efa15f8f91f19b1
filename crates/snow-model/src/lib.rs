//! Entity model for Snowcache.
//!
//! Every cached entity is an [`Entity<S>`]: an identity, an atomically
//! swapped state snapshot `S`, a deleted flag and a change tracker. Readers
//! take a snapshot and never see a half-applied merge; writers go through
//! [`Entity::mutate`], which is serialized per entity.
//!
//! The [`Registry`] owns one [`IdentityCache`](snow_cache::IdentityCache) per
//! entity type and is the single ingestion path: it merges payloads, links
//! children into their guild and rebuilds the guild's derived views.
//!
//! # Key Types
//!
//! - [`Guild`], [`Channel`], [`Role`], [`Member`], [`User`], [`Emoji`]: entity aliases
//! - [`VoiceState`]: value type owned by a guild
//! - [`Registry`]: caches plus payload application
//! - [`EntityScope`]: live guild context for write guards

pub mod channel;
pub mod emoji;
pub mod entity;
pub mod error;
pub mod guild;
pub mod member;
pub mod registry;
pub mod role;
pub mod scope;
pub mod user;
pub mod voice;

pub use channel::{Channel, ChannelState};
pub use emoji::{Emoji, EmojiState};
pub use entity::{Entity, EntityState};
pub use error::{ModelError, ModelResult};
pub use guild::{Guild, GuildState};
pub use member::{Member, MemberState};
pub use registry::{Applied, Registered, Registry};
pub use role::{Role, RoleState};
pub use scope::EntityScope;
pub use user::{User, UserState};
pub use voice::VoiceState;
