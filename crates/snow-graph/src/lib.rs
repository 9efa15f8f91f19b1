//! Graph rebuilder for Snowcache.
//!
//! Derived views are recomputed from an owner's collections, never edited in
//! place. Every builder here is a pure function of its input slice: the same
//! collection contents always produce the same view. Callers swap the finished
//! view in atomically, so readers see either the old view or the new one.
//!
//! Rebuilds are O(n log n) in the collection size. That is fine at guild scale
//! (hundreds of channels, thousands of voice states).
//!
//! # Modules
//!
//! - [`node`]: Traits the rebuilders read entities through
//! - [`channels`]: [`ChannelViews`]: typed channel buckets and category links
//! - [`voice`]: [`VoiceMembership`]: which users sit in which voice channel

pub mod channels;
pub mod node;
pub mod voice;

pub use channels::{resolve, ChannelViews};
pub use node::{ChannelLayout, ChannelNode, VoiceNode};
pub use voice::VoiceMembership;
