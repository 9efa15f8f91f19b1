//! Change-tracking unit of work for Snowcache.
//!
//! Application code never writes cached fields directly. It opens a
//! [`ChangeSession`] on an entity, stages field writes and child edits, and
//! applies the session. Applying diffs the staged values against the values
//! seen when staging started, sends exactly one [`ChangeSet`] through the
//! transport and merges the remote-authoritative reply back in patch mode.
//!
//! # Phases
//!
//! ```text
//! Idle --begin--> Staging --apply--> Committing --ok--> Idle (fields merged)
//!                    |                    '--err/timeout--> Idle (nothing applied)
//!                    '--discard/drop--> Idle
//! ```
//!
//! A second `begin` while an entity is not idle fails with
//! [`ChangeError::Locked`]; [`ChangeSession::begin_queued`] waits instead.
//! Every staged write runs the [`guard`] pipeline before anything is recorded.
//!
//! [`ChangeSet`]: snow_types::ChangeSet

pub mod config;
pub mod error;
pub mod guard;
pub mod session;
pub mod trackable;
pub mod tracker;

pub use config::ChangeConfig;
pub use error::{ChangeError, ChangeResult};
pub use guard::{check_entity, check_write, WriteAttempt, WriteGuard};
pub use session::{write_direct, ChangeSession, CommitOutcome};
pub use trackable::{Scope, Trackable, Unscoped};
pub use tracker::{ChangeTracker, Phase};
