//! # Lookup Cache
//!
//! Cache-aside reads of one entity type by an arbitrary field/value pair.
//!
//! `get` checks, in order:
//! 1. the negative entry (only when the caller opts in), answering "not found"
//!    without touching the store;
//! 2. the positive entry, answering with the cached snapshot;
//! 3. the document store.
//!
//! After a store read the cache is populated by a detached task: a found
//! document is written with the positive TTL, and a miss is remembered with
//! the negative TTL when the caller opted in. The caller never waits for, or
//! observes the outcome of, that write. Failures are logged and dropped.
//!
//! Cache read failures are returned to the caller rather than treated as a
//! miss, so a flaky cache never silently shifts load onto the store.
//!
//! No single-flight coordination is done: concurrent misses for the same key
//! all query the store and all populate the cache. Repository mutations leave
//! existing entries in place, so a lookup can return a stale snapshot until its
//! TTL elapses.

use super::{CacheClient, CacheError, CacheKey, CacheResult};
use crate::core::config::EntityConfig;
use crate::core::error::PersistResult;
use crate::entity::Entity;
use crate::repository::Repository;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Payload stored under a negative-cache key
pub const NEGATIVE_MARKER: &[u8] = b"neg";

/// Cache-aside lookups for entity type `E`
pub struct LookupCache<E: Entity> {
    repository: Repository<E>,
    cache: Arc<dyn CacheClient>,
}

impl<E: Entity> Clone for LookupCache<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<E: Entity> LookupCache<E> {
    pub fn new(repository: Repository<E>, cache: Arc<dyn CacheClient>) -> Self {
        Self { repository, cache }
    }

    pub fn config(&self) -> &EntityConfig {
        self.repository.config()
    }

    pub fn repository(&self) -> &Repository<E> {
        &self.repository
    }

    /// Key under which a `field = value` lookup is cached
    pub fn key(&self, field: &str, value: &str) -> CacheResult<CacheKey> {
        CacheKey::for_entity(self.config(), field, value)
    }

    /// Find an entity by `field = value`, serving from the cache when possible
    ///
    /// Returns `Ok(None)` when no document matches. With `use_negative_cache`
    /// that answer is remembered for the negative TTL and repeated lookups skip
    /// the store.
    pub async fn get(&self, field: &str, value: &str, use_negative_cache: bool) -> PersistResult<Option<E>> {
        let result = self.lookup(field, value, use_negative_cache).await;
        if let Err(e) = &result {
            record_lookup_error::<E>(e.error_type());
        }
        result
    }

    async fn lookup(&self, field: &str, value: &str, use_negative_cache: bool) -> PersistResult<Option<E>> {
        let key = self.key(field, value)?;

        if use_negative_cache {
            if present(self.cache.get(&key.negative()).await?).is_some() {
                debug!("Negative cache hit for key: {}", key);
                record_lookup::<E>("negative_hit");
                return Ok(None);
            }
        }

        if let Some(payload) = present(self.cache.get(key.as_str()).await?) {
            let entity: E = serde_json::from_slice(&payload).map_err(CacheError::from)?;
            debug!("Cache hit for key: {}", key);
            record_lookup::<E>("hit");
            return Ok(Some(entity));
        }

        debug!("Cache miss for key: {}", key);
        record_lookup::<E>("miss");

        match self.repository.find_one(field, value).await? {
            Some(entity) => {
                self.spawn_fill(key, entity.clone());
                Ok(Some(entity))
            }
            None => {
                if use_negative_cache {
                    self.spawn_fill_negative(key);
                }
                Ok(None)
            }
        }
    }

    /// Re-read `field = value` from the store and write the result through
    ///
    /// On a hit the positive entry is replaced and any negative entry removed.
    /// Unlike `get`, every failure is returned to the caller.
    pub async fn refresh(&self, field: &str, value: &str) -> PersistResult<Option<E>> {
        let key = self.key(field, value)?;

        let entity = match self.repository.find_one(field, value).await? {
            Some(entity) => entity,
            None => return Ok(None),
        };

        let payload = serde_json::to_vec(&entity).map_err(CacheError::from)?;
        self.cache.set(key.as_str(), &payload, self.config().cache_ttl).await?;
        self.cache.delete(&key.negative()).await?;

        debug!("Refreshed cache entry for key: {}", key);
        Ok(Some(entity))
    }

    fn spawn_fill(&self, key: CacheKey, entity: E) {
        let cache = self.cache.clone();
        let ttl = self.config().cache_ttl;

        tokio::spawn(async move {
            let payload = match serde_json::to_vec(&entity) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(entity_type = E::ENTITY_TYPE, key = %key, error = %e, "Error serializing cache entry");
                    record_population_failure::<E>("serialize");
                    return;
                }
            };

            if let Err(e) = cache.set(key.as_str(), &payload, ttl).await {
                warn!(entity_type = E::ENTITY_TYPE, key = %key, error = %e, "Error filling cache");
                record_population_failure::<E>("positive");
            }
        });
    }

    fn spawn_fill_negative(&self, key: CacheKey) {
        let cache = self.cache.clone();
        let ttl = self.config().negative_cache_ttl;

        tokio::spawn(async move {
            let negative_key = key.negative();
            if let Err(e) = cache.set(&negative_key, NEGATIVE_MARKER, ttl).await {
                warn!(entity_type = E::ENTITY_TYPE, key = %negative_key, error = %e, "Error filling negative cache");
                record_population_failure::<E>("negative");
            }
        });
    }
}

/// An empty payload counts as absent
fn present(payload: Option<Vec<u8>>) -> Option<Vec<u8>> {
    payload.filter(|p| !p.is_empty())
}

fn record_lookup<E: Entity>(outcome: &'static str) {
    counter!("document_cache_lookups_total", "entity" => E::ENTITY_TYPE, "outcome" => outcome).increment(1);
}

fn record_lookup_error<E: Entity>(kind: &'static str) {
    counter!("document_cache_lookup_errors_total", "entity" => E::ENTITY_TYPE, "kind" => kind).increment(1);
}

fn record_population_failure<E: Entity>(kind: &'static str) {
    counter!("document_cache_population_failures_total", "entity" => E::ENTITY_TYPE, "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{CacheStoreStats, InMemoryCache, InMemoryCacheConfig};
    use crate::core::error::PersistError;
    use crate::models::Widget;
    use crate::store::{DocumentStore, InMemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::sleep;

    struct Fixture {
        store: Arc<InMemoryStore>,
        cache: Arc<InMemoryCache>,
        lookup: LookupCache<Widget>,
    }

    fn fixture(config: EntityConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryCache::new(InMemoryCacheConfig::default()));
        let repository = Repository::new(store.clone(), config);
        let lookup = LookupCache::new(repository, cache.clone());
        Fixture { store, cache, lookup }
    }

    async fn wait_for_key(cache: &InMemoryCache, key: &str) {
        for _ in 0..100 {
            if cache.get(key).await.unwrap().is_some() {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
        panic!("cache key {} was never populated", key);
    }

    #[tokio::test]
    async fn test_hit_after_population() {
        let f = fixture(EntityConfig::new("main", "widgets"));
        let mut widget = Widget::new("A1");
        f.lookup.repository().create(&mut widget).await.unwrap();

        let first = f.lookup.get("code", "A1", false).await.unwrap();
        assert_eq!(first.as_ref(), Some(&widget));
        assert_eq!(f.store.stats().finds, 1);

        let key = f.lookup.key("code", "A1").unwrap();
        wait_for_key(&f.cache, key.as_str()).await;

        let second = f.lookup.get("code", "A1", false).await.unwrap();
        assert_eq!(second, Some(widget));
        assert_eq!(f.store.stats().finds, 1);
    }

    #[tokio::test]
    async fn test_negative_cache_short_circuits_store() {
        let f = fixture(EntityConfig::new("main", "widgets"));

        assert!(f.lookup.get("code", "ZZ", true).await.unwrap().is_none());
        assert_eq!(f.store.stats().finds, 1);

        let key = f.lookup.key("code", "ZZ").unwrap();
        wait_for_key(&f.cache, &key.negative()).await;
        assert_eq!(f.cache.get(&key.negative()).await.unwrap(), Some(b"neg".to_vec()));

        assert!(f.lookup.get("code", "ZZ", true).await.unwrap().is_none());
        assert_eq!(f.store.stats().finds, 1);
    }

    #[tokio::test]
    async fn test_miss_without_negative_cache_is_not_remembered() {
        let f = fixture(EntityConfig::new("main", "widgets"));

        assert!(f.lookup.get("code", "ZZ", false).await.unwrap().is_none());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(f.cache.stats().await.unwrap().entries, 0);

        assert!(f.lookup.get("code", "ZZ", false).await.unwrap().is_none());
        assert_eq!(f.store.stats().finds, 2);
    }

    #[tokio::test]
    async fn test_negative_entry_ignored_when_not_requested() {
        let f = fixture(EntityConfig::new("main", "widgets"));
        let key = f.lookup.key("code", "A1").unwrap();
        f.cache.set(&key.negative(), b"neg", Duration::from_secs(60)).await.unwrap();

        let mut widget = Widget::new("A1");
        f.lookup.repository().create(&mut widget).await.unwrap();

        assert!(f.lookup.get("code", "A1", true).await.unwrap().is_none());
        assert_eq!(f.lookup.get("code", "A1", false).await.unwrap(), Some(widget));
    }

    #[tokio::test]
    async fn test_empty_payload_counts_as_miss() {
        let f = fixture(EntityConfig::new("main", "widgets"));
        let key = f.lookup.key("code", "ZZ").unwrap();
        f.cache.set(&key.negative(), b"", Duration::from_secs(60)).await.unwrap();
        f.cache.set(key.as_str(), b"", Duration::from_secs(60)).await.unwrap();

        assert!(f.lookup.get("code", "ZZ", true).await.unwrap().is_none());
        assert_eq!(f.store.stats().finds, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_an_error() {
        let f = fixture(EntityConfig::new("main", "widgets"));
        let key = f.lookup.key("code", "A1").unwrap();
        f.cache.set(key.as_str(), b"{not json", Duration::from_secs(60)).await.unwrap();

        let err = f.lookup.get("code", "A1", false).await.unwrap_err();
        assert!(matches!(err, PersistError::Cache(CacheError::Serialization(_))));
        assert_eq!(f.store.stats().finds, 0);
    }

    #[tokio::test]
    async fn test_positive_ttl_expiry_falls_through() {
        let config = EntityConfig::new("main", "widgets").with_ttls(Duration::from_millis(100), Duration::from_millis(50));
        let f = fixture(config);
        let mut widget = Widget::new("A1");
        f.lookup.repository().create(&mut widget).await.unwrap();

        f.lookup.get("code", "A1", false).await.unwrap();
        let key = f.lookup.key("code", "A1").unwrap();
        wait_for_key(&f.cache, key.as_str()).await;
        f.lookup.get("code", "A1", false).await.unwrap();
        assert_eq!(f.store.stats().finds, 1);

        sleep(Duration::from_millis(150)).await;

        assert_eq!(f.lookup.get("code", "A1", false).await.unwrap(), Some(widget));
        assert_eq!(f.store.stats().finds, 2);
    }

    #[tokio::test]
    async fn test_negative_ttl_expiry_reaches_store_again() {
        let config = EntityConfig::new("main", "widgets").with_ttls(Duration::from_secs(60), Duration::from_millis(50));
        let f = fixture(config);
        let key = f.lookup.key("code", "A1").unwrap();

        assert!(f.lookup.get("code", "A1", true).await.unwrap().is_none());
        wait_for_key(&f.cache, &key.negative()).await;
        assert!(f.lookup.get("code", "A1", true).await.unwrap().is_none());
        assert_eq!(f.store.stats().finds, 1);

        sleep(Duration::from_millis(100)).await;
        let mut widget = Widget::new("A1");
        f.lookup.repository().create(&mut widget).await.unwrap();

        let found = f.lookup.get("code", "A1", true).await.unwrap();
        assert_eq!(found, Some(widget));
        assert_eq!(f.store.stats().finds, 2);
    }

    #[tokio::test]
    async fn test_refresh_replaces_entries() {
        let f = fixture(EntityConfig::new("main", "widgets"));
        let key = f.lookup.key("code", "A1").unwrap();
        f.cache.set(&key.negative(), b"neg", Duration::from_secs(60)).await.unwrap();

        let mut widget = Widget::new("A1");
        f.lookup.repository().create(&mut widget).await.unwrap();

        let refreshed = f.lookup.refresh("code", "A1").await.unwrap();
        assert_eq!(refreshed.as_ref(), Some(&widget));
        assert_eq!(f.cache.get(&key.negative()).await.unwrap(), None);

        let finds = f.store.stats().finds;
        assert_eq!(f.lookup.get("code", "A1", true).await.unwrap(), Some(widget));
        assert_eq!(f.store.stats().finds, finds);

        assert!(f.lookup.refresh("code", "missing").await.unwrap().is_none());
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheClient for BrokenCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Err(CacheError::Unavailable)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Unavailable)
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::Unavailable)
        }

        async fn stats(&self) -> CacheResult<CacheStoreStats> {
            Err(CacheError::Unavailable)
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Ok(false)
        }
    }

    /// Reads succeed (always empty), writes always fail
    struct ReadOnlyCache;

    #[async_trait]
    impl CacheClient for ReadOnlyCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            Err(CacheError::Store {
                message: "read-only replica".to_string(),
            })
        }

        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }

        async fn stats(&self) -> CacheResult<CacheStoreStats> {
            Ok(CacheStoreStats::default())
        }

        async fn health_check(&self) -> CacheResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_population_failures_are_swallowed() {
        let store = Arc::new(InMemoryStore::new());
        let repository: Repository<Widget> = Repository::new(store.clone(), EntityConfig::new("main", "widgets"));
        let lookup = LookupCache::new(repository, Arc::new(ReadOnlyCache));

        let mut widget = Widget::new("A1");
        lookup.repository().create(&mut widget).await.unwrap();

        assert_eq!(lookup.get("code", "A1", false).await.unwrap(), Some(widget.clone()));
        assert!(lookup.get("code", "ZZ", true).await.unwrap().is_none());
        sleep(Duration::from_millis(20)).await;

        // Every call keeps falling through, but none of them fail
        assert_eq!(lookup.get("code", "A1", true).await.unwrap(), Some(widget));
        assert_eq!(store.stats().finds, 3);
    }

    #[tokio::test]
    async fn test_cache_read_errors_are_not_misses() {
        let store = Arc::new(InMemoryStore::new());
        let repository: Repository<Widget> = Repository::new(store.clone(), EntityConfig::new("main", "widgets"));
        let lookup = LookupCache::new(repository, Arc::new(BrokenCache));

        for use_negative_cache in [true, false] {
            let err = lookup.get("code", "A1", use_negative_cache).await.unwrap_err();
            assert!(matches!(err, PersistError::Cache(CacheError::Unavailable)));
            assert_eq!(err.error_type(), "cache_error");
        }
        assert_eq!(store.stats().finds, 0);
    }
}
