//! High-level client for Snowcache.
//!
//! [`Client`] wires the entity registry, the message cache, the unit of work
//! and the reaction reconciler to one [`Transport`](snow_transport::Transport).
//! It is the entry point for the decoder (ingestion) and for application code
//! (reads, commits, reaction repair).

pub mod client;
pub mod config;
pub mod error;
pub mod event;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use event::CacheEvent;

// Re-export key types
pub use snow_changes::{ChangeSession, CommitOutcome};
pub use snow_model::{Applied, Channel, Emoji, Guild, Member, Registry, Role, User};
pub use snow_reactions::{Message, Repaired};
pub use snow_types::{EntityKind, EntityPayload, ReactionEmoji, ReactionEvent, Snowflake};
