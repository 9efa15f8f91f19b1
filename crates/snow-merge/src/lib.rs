//! Merge engine for Snowcache.
//!
//! Pure functions that combine an entity's current field values with an
//! incoming payload's [`FieldState`](snow_types::FieldState) values.
//!
//! # Modes
//!
//! - [`MergeMode::Full`]: the payload is a complete snapshot. Every field is
//!   written, and a field the snapshot leaves out is reset to empty.
//! - [`MergeMode::Patch`]: the payload may be partial. Only fields the payload
//!   explicitly carries (including explicit nulls) are written.
//!
//! Owned collections are never merged element-wise: a sent list replaces the
//! whole collection, an unsent list leaves it alone in either mode.
//!
//! Malformed fields (a null for a required value, a value failing validation)
//! are skipped and recorded in the [`MergeReport`]; the rest of the payload
//! still applies.

pub mod error;
pub mod field;
pub mod report;

pub use error::MergeError;
pub use field::{
    merge_collection, merge_option, merge_validated, merge_value, CollectionUpdate, Merge,
    MergeMode,
};
pub use report::MergeReport;
