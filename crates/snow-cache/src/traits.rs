use snow_types::{EntityKind, Snowflake};

/// An entity that can live in an [`IdentityCache`](crate::IdentityCache).
///
/// Implementations must report a stable identity: the value returned by
/// [`Cached::id`] never changes for the lifetime of the instance.
pub trait Cached: Send + Sync + 'static {
    /// The entity type this cache holds.
    const KIND: EntityKind;

    /// The identity the instance is cached under.
    fn id(&self) -> Snowflake;
}
