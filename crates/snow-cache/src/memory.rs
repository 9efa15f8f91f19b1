use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use snow_types::{EntityKind, Snowflake};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::{CacheError, CacheResult};
use crate::traits::Cached;

/// A download in progress. `None` records a definitive "not found".
type Flight<T> = Arc<OnceCell<Option<Arc<T>>>>;

/// Concurrent identity map for one entity type.
///
/// Entries are sharded (`DashMap`), so unrelated identities never contend.
/// Entities are handed out as `Arc<T>`; the cache itself never clones an
/// entity.
pub struct IdentityCache<T> {
    entries: DashMap<Snowflake, Arc<T>>,
    inflight: DashMap<Snowflake, Flight<T>>,
}

impl<T: Cached> IdentityCache<T> {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// The entity type held by this cache.
    pub fn kind(&self) -> EntityKind {
        T::KIND
    }

    /// Look up a cached entity without side effects.
    pub fn try_get(&self, id: Snowflake) -> Option<Arc<T>> {
        self.entries.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns `true` if the identity is cached.
    pub fn contains(&self, id: Snowflake) -> bool {
        self.entries.contains_key(&id)
    }

    /// Return the cached entity, creating it with `create` on a miss.
    ///
    /// `create` runs while the key's shard is locked and must not touch this
    /// cache; build a bare shell there and use [`Self::get_or_create_with`] for
    /// anything that needs to look entities up.
    pub fn get_or_create(&self, id: Snowflake, create: impl FnOnce(Snowflake) -> T) -> Arc<T> {
        self.get_or_create_with(id, create, |_| {}).0
    }

    /// Return the cached entity, creating and then populating it on a miss.
    ///
    /// The shell built by `create` is published before `populate` runs, so
    /// `populate` may resolve references back to the new entity (a guild
    /// instantiating channels that point at the guild). `populate` only runs
    /// for the caller that created the entry. The flag reports whether this
    /// call created it.
    pub fn get_or_create_with(
        &self,
        id: Snowflake,
        create: impl FnOnce(Snowflake) -> T,
        populate: impl FnOnce(&Arc<T>),
    ) -> (Arc<T>, bool) {
        let (entity, created) = match self.entries.entry(id) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let entity = Arc::new(create(id));
                vacant.insert(Arc::clone(&entity));
                (entity, true)
            }
        };

        if created {
            trace!(kind = %T::KIND, %id, "entity published");
            populate(&entity);
        }
        (entity, created)
    }

    /// Return the cached entity, downloading it on a miss.
    ///
    /// Concurrent misses for the same identity share a single call to a
    /// `fetch`; later callers wait for the first one. `Ok(None)` means the
    /// identity definitively does not exist upstream. A fetch error is handed
    /// to the caller whose fetch failed, and the next waiter retries with its
    /// own fetch.
    ///
    /// Entities returned by `fetch` that are not yet cached are published;
    /// if another path cached the identity meanwhile, the cached instance wins.
    pub async fn get_or_download<F, Fut>(&self, id: Snowflake, fetch: F) -> CacheResult<Option<Arc<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Option<Arc<T>>>>,
    {
        if let Some(hit) = self.try_get(id) {
            return Ok(Some(hit));
        }

        let flight: Flight<T> = Arc::clone(
            self.inflight
                .entry(id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let outcome = flight
            .get_or_try_init(|| async move {
                if let Some(hit) = self.try_get(id) {
                    return Ok(Some(hit));
                }
                debug!(kind = %T::KIND, %id, "cache miss, downloading");
                match fetch().await? {
                    Some(fetched) if fetched.id() != id => Err(CacheError::IdentityMismatch {
                        requested: id,
                        fetched: fetched.id(),
                    }),
                    Some(fetched) => Ok(Some(Arc::clone(
                        self.entries.entry(id).or_insert(fetched).value(),
                    ))),
                    None => {
                        debug!(kind = %T::KIND, %id, "not found upstream");
                        Ok(None)
                    }
                }
            })
            .await
            .cloned();

        self.inflight.remove_if(&id, |_, current| Arc::ptr_eq(current, &flight));
        outcome
    }

    /// Remove an entity from the cache, returning it if it was present.
    ///
    /// Outstanding `Arc`s stay valid; the identity simply stops resolving.
    pub fn remove(&self, id: Snowflake) -> Option<Arc<T>> {
        self.entries.remove(&id).map(|(_, entity)| entity)
    }

    /// Remove the cached entity for `id` only if `stale` holds for it.
    ///
    /// The check and the removal are atomic with respect to other writers of
    /// the same identity, so a fresh instance published meanwhile survives.
    pub fn remove_if(&self, id: Snowflake, stale: impl FnOnce(&T) -> bool) -> Option<Arc<T>> {
        self.entries
            .remove_if(&id, |_, entity| stale(entity))
            .map(|(_, entity)| entity)
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All cached identities, sorted (and therefore in creation order).
    pub fn ids(&self) -> Vec<Snowflake> {
        let mut ids: Vec<Snowflake> = self.entries.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// A point-in-time list of all cached entities, sorted by identity.
    pub fn values(&self) -> Vec<Arc<T>> {
        let mut values: Vec<Arc<T>> = self.entries.iter().map(|e| Arc::clone(e.value())).collect();
        values.sort_by_key(|entity| entity.id());
        values
    }
}

impl<T: Cached> Default for IdentityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Cached> std::fmt::Debug for IdentityCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("kind", &T::KIND)
            .field("entity_count", &self.len())
            .field("inflight", &self.inflight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug)]
    struct Item {
        id: Snowflake,
        label: Mutex<String>,
    }

    impl Item {
        fn shell(id: Snowflake) -> Self {
            Self {
                id,
                label: Mutex::new(String::new()),
            }
        }

        fn label(&self) -> String {
            self.label.lock().unwrap().clone()
        }
    }

    impl Cached for Item {
        const KIND: EntityKind = EntityKind::Channel;

        fn id(&self) -> Snowflake {
            self.id
        }
    }

    fn sf(raw: u64) -> Snowflake {
        Snowflake::new(raw)
    }

    async fn found(raw: u64) -> CacheResult<Option<Arc<Item>>> {
        Ok(Some(Arc::new(Item::shell(sf(raw)))))
    }

    async fn missing() -> CacheResult<Option<Arc<Item>>> {
        Ok(None)
    }

    async fn unreachable_remote() -> CacheResult<Option<Arc<Item>>> {
        Err(CacheError::Remote("503".into()))
    }

    // -----------------------------------------------------------------------
    // Get / create
    // -----------------------------------------------------------------------

    #[test]
    fn get_or_create_returns_same_instance() {
        let cache = IdentityCache::<Item>::new();
        let a = cache.get_or_create(sf(1), Item::shell);
        let b = cache.get_or_create(sf(1), Item::shell);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn try_get_misses_until_created() {
        let cache = IdentityCache::<Item>::new();
        assert!(cache.try_get(sf(1)).is_none());
        cache.get_or_create(sf(1), Item::shell);
        assert!(cache.try_get(sf(1)).is_some());
        assert!(cache.contains(sf(1)));
    }

    #[test]
    fn populate_runs_after_publication() {
        let cache = IdentityCache::<Item>::new();
        let (entity, created) = cache.get_or_create_with(sf(7), Item::shell, |fresh| {
            // The shell must already resolve through the cache.
            let found = cache.try_get(sf(7)).expect("published before populate");
            assert!(Arc::ptr_eq(&found, fresh));
            *fresh.label.lock().unwrap() = "populated".into();
        });
        assert!(created);
        assert_eq!(entity.label(), "populated");
    }

    #[test]
    fn populate_skipped_for_existing_entry() {
        let cache = IdentityCache::<Item>::new();
        cache.get_or_create(sf(7), Item::shell);
        let (_, created) = cache.get_or_create_with(sf(7), Item::shell, |_| {
            panic!("populate must not run for an existing entity");
        });
        assert!(!created);
    }

    #[test]
    fn remove_and_listing() {
        let cache = IdentityCache::<Item>::new();
        for raw in [30, 10, 20] {
            cache.get_or_create(sf(raw), Item::shell);
        }
        assert_eq!(cache.ids(), vec![sf(10), sf(20), sf(30)]);
        let removed = cache.remove(sf(20)).expect("was cached");
        assert_eq!(removed.id(), sf(20));
        assert!(cache.remove(sf(20)).is_none());
        let ids: Vec<_> = cache.values().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec![sf(10), sf(30)]);
    }

    #[test]
    fn remove_if_spares_a_replacement() {
        let cache = IdentityCache::<Item>::new();
        let first = cache.get_or_create(sf(1), Item::shell);
        *first.label.lock().unwrap() = "dead".into();

        assert!(cache.remove_if(sf(1), |item| item.label() == "live").is_none());
        assert!(cache.remove_if(sf(1), |item| item.label() == "dead").is_some());
        assert!(!cache.contains(sf(1)));

        let second = cache.get_or_create(sf(1), Item::shell);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(cache.remove_if(sf(1), |item| item.label() == "dead").is_none());
        assert!(Arc::ptr_eq(&cache.try_get(sf(1)).unwrap(), &second));
    }

    #[test]
    fn concurrent_get_or_create_yields_one_instance() {
        let cache = Arc::new(IdentityCache::<Item>::new());
        let creations = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let creations = Arc::clone(&creations);
                thread::spawn(move || {
                    cache.get_or_create(sf(42), |id| {
                        creations.fetch_add(1, Ordering::SeqCst);
                        Item::shell(id)
                    })
                })
            })
            .collect();

        let instances: Vec<Arc<Item>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();

        assert_eq!(creations.load(Ordering::SeqCst), 1);
        for instance in &instances {
            assert!(Arc::ptr_eq(instance, &instances[0]));
        }
    }

    // -----------------------------------------------------------------------
    // Downloads
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn download_hit_skips_fetch() {
        let cache = IdentityCache::<Item>::new();
        let cached = cache.get_or_create(sf(1), Item::shell);
        let fetches = AtomicUsize::new(0);
        let hit = cache
            .get_or_download(sf(1), || {
                fetches.fetch_add(1, Ordering::SeqCst);
                found(1)
            })
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&cached, &hit));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn download_publishes_fetched_entity() {
        let cache = IdentityCache::<Item>::new();
        let fetched = cache
            .get_or_download(sf(3), || found(3))
            .await
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&fetched, &cache.try_get(sf(3)).unwrap()));
    }

    #[tokio::test]
    async fn download_not_found_is_a_value() {
        let cache = IdentityCache::<Item>::new();
        let outcome = cache
            .get_or_download(sf(3), missing)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn download_error_propagates_and_next_call_retries() {
        let cache = IdentityCache::<Item>::new();
        let err = cache
            .get_or_download(sf(3), unreachable_remote)
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::Remote("503".into()));

        let retried = cache
            .get_or_download(sf(3), || found(3))
            .await
            .unwrap();
        assert!(retried.is_some());
    }

    #[tokio::test]
    async fn download_rejects_identity_mismatch() {
        let cache = IdentityCache::<Item>::new();
        let err = cache
            .get_or_download(sf(3), || found(4))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::IdentityMismatch { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_downloads_are_single_flight() {
        let cache = Arc::new(IdentityCache::<Item>::new());
        let fetches = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let fetches = Arc::clone(&fetches);
                tokio::spawn(async move {
                    cache
                        .get_or_download(sf(9), || async move {
                            fetches.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            found(9).await
                        })
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap().unwrap());
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        for entity in &results {
            assert!(Arc::ptr_eq(entity, &results[0]));
        }
    }

    #[test]
    fn debug_format() {
        let cache = IdentityCache::<Item>::new();
        cache.get_or_create(sf(1), Item::shell);
        let debug = format!("{cache:?}");
        assert!(debug.contains("IdentityCache"));
        assert!(debug.contains("entity_count"));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_identity_maps_to_one_instance(ids in proptest::collection::vec(0u64..16, 1..64)) {
                let cache = IdentityCache::<Item>::new();
                let first: Vec<Arc<Item>> = ids.iter().map(|raw| cache.get_or_create(sf(*raw), Item::shell)).collect();
                for (raw, instance) in ids.iter().zip(&first) {
                    let again = cache.get_or_create(sf(*raw), Item::shell);
                    prop_assert!(Arc::ptr_eq(instance, &again));
                }
                let distinct: std::collections::BTreeSet<u64> = ids.iter().copied().collect();
                prop_assert_eq!(cache.len(), distinct.len());
            }
        }
    }
}
