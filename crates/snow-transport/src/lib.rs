//! Transport contract for Snowcache.
//!
//! The core never speaks HTTP or decodes JSON itself. It talks to the remote
//! service through the [`Transport`] trait, which hands back fully typed
//! payloads. HTTP plumbing, retries and rate limits live behind the trait.
//!
//! [`ScriptedTransport`] is an in-memory implementation for tests and
//! embedding: it serves fetches from a map and replays queued commit replies.

pub mod error;
pub mod scripted;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use scripted::{CommitGate, ScriptedTransport};
pub use traits::{ReactorQuery, Transport, MAX_REACTORS_PER_PAGE};
