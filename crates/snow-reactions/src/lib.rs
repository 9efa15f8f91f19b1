//! Message reactions for Snowcache.
//!
//! A message's reactions are tracked twice: as the raw per-emoji counters the
//! remote service pushes, and as two reverse indices (emoji to reactors, user
//! to emoji) built from reaction events. Events are not guaranteed to arrive
//! for every change, so the two drift apart. The container detects the drift
//! and the [`ReactionReconciler`] repairs it with a bounded download of the
//! actual reactors.
//!
//! # Key Types
//!
//! - [`Message`]: cached message owning one [`ReactionContainer`]
//! - [`ReactionContainer`]: raw counters plus both reverse indices
//! - [`ReactionReconciler`]: desync repair against a [`Transport`](snow_transport::Transport)
//! - [`ReactionConfig`]: repair limits and policy

pub mod config;
pub mod container;
pub mod error;
pub mod message;
pub mod reconciler;

pub use config::{ReactionConfig, RepairPolicy};
pub use container::{Reaction, ReactionContainer, ReactionState};
pub use error::{ReactionError, ReactionResult};
pub use message::Message;
pub use reconciler::{ReactionReconciler, Repaired};
