//! Identity cache for Snowcache.
//!
//! Holds exactly one live instance per entity identity. Every ingestion path
//! and every application read goes through an [`IdentityCache`], so two callers
//! asking for the same [`Snowflake`](snow_types::Snowflake) always share one
//! `Arc`.
//!
//! # Design Rules
//!
//! 1. At most one instance per identity, ever (creation is atomic per key).
//! 2. A freshly created entity is published before it is populated, so
//!    populating code can look itself (or its parent) up again.
//! 3. Downloads are single-flight per identity: concurrent misses share one
//!    remote fetch.
//! 4. "Does not exist upstream" is a value (`Ok(None)`), not an error.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::IdentityCache;
pub use traits::Cached;
