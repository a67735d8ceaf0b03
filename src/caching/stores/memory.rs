//! # In-Memory Cache Client
//!
//! A process-local cache with per-entry TTL, a bounded entry count and a
//! background sweep of expired entries. Useful for single-node deployments and
//! as the cache in tests.

use super::{CacheClient, CacheStoreStats};
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::debug;

/// In-memory cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCacheConfig {
    /// Maximum number of entries
    pub max_entries: usize,

    /// Maximum memory usage in bytes
    pub max_memory_bytes: usize,

    /// Cleanup interval for expired entries
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for InMemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10000,
            max_memory_bytes: 100 * 1024 * 1024, // 100MB
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Cached payload with its expiry
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
    size: usize,
}

impl CacheEntry {
    fn new(key: &str, value: Vec<u8>, ttl: Duration) -> Self {
        let size = key.len() + value.len() + std::mem::size_of::<Self>();
        Self {
            value,
            expires_at: Instant::now() + ttl,
            size,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cache implementation
pub struct InMemoryCache {
    /// Configuration
    config: InMemoryCacheConfig,

    /// Cache entries storage
    entries: Arc<DashMap<String, CacheEntry>>,

    /// Atomic counters for statistics
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired_cleanups: Arc<AtomicU64>,

    /// Current memory usage estimate
    memory_usage: Arc<AtomicUsize>,

    /// Cleanup task handle, aborted on drop
    cleanup_task: Option<JoinHandle<()>>,
}

impl InMemoryCache {
    /// Create a new in-memory cache
    ///
    /// The expiry sweep is only started when a Tokio runtime is available;
    /// expired entries are also dropped lazily on read.
    pub fn new(config: InMemoryCacheConfig) -> Self {
        let entries = Arc::new(DashMap::new());
        let expired_cleanups = Arc::new(AtomicU64::new(0));
        let memory_usage = Arc::new(AtomicUsize::new(0));

        let cleanup_task = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let entries = entries.clone();
            let expired_cleanups = expired_cleanups.clone();
            let memory_usage = memory_usage.clone();
            let cleanup_interval = config.cleanup_interval;

            handle.spawn(async move {
                let mut interval = interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired_entries(&entries, &expired_cleanups, &memory_usage);
                }
            })
        });

        Self {
            config,
            entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired_cleanups,
            memory_usage,
            cleanup_task,
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.value().is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cleanup expired entries
    fn cleanup_expired_entries(
        entries: &DashMap<String, CacheEntry>,
        expired_cleanups: &AtomicU64,
        memory_usage: &AtomicUsize,
    ) -> usize {
        let expired_keys: Vec<String> = entries
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        let mut cleaned_count = 0;
        let mut freed_memory = 0;

        for key in expired_keys {
            if let Some((_, entry)) = entries.remove_if(&key, |_, e| e.is_expired()) {
                freed_memory += entry.size;
                cleaned_count += 1;
            }
        }

        if cleaned_count > 0 {
            memory_usage.fetch_sub(freed_memory, Ordering::Relaxed);
            expired_cleanups.fetch_add(cleaned_count as u64, Ordering::Relaxed);
            debug!("Cleaned up {} expired cache entries, freed {} bytes", cleaned_count, freed_memory);
        }

        cleaned_count
    }

    /// Make room for one more entry of `incoming` bytes
    fn evict_if_needed(&self, incoming: usize) -> CacheResult<()> {
        if incoming > self.config.max_memory_bytes {
            return Err(CacheError::Store {
                message: format!(
                    "Entry of {} bytes exceeds cache capacity of {} bytes",
                    incoming, self.config.max_memory_bytes
                ),
            });
        }

        let is_full = |cache: &Self| {
            cache.entries.len() >= cache.config.max_entries
                || cache.memory_usage.load(Ordering::Relaxed) + incoming > cache.config.max_memory_bytes
        };

        if !is_full(self) {
            return Ok(());
        }

        Self::cleanup_expired_entries(&self.entries, &self.expired_cleanups, &self.memory_usage);

        // Evict the entries closest to expiry until there is room
        while is_full(self) {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());

            let Some(key) = victim else { break };
            if let Some((_, entry)) = self.entries.remove(&key) {
                self.memory_usage.fetch_sub(entry.size, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Evicted cache entry {}", key);
            }
        }

        Ok(())
    }

    fn remove_entry(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.memory_usage.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }
}

impl Drop for InMemoryCache {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let lookup = self.entries.get(key).map(|entry| {
            if entry.is_expired() {
                None
            } else {
                Some(entry.value.clone())
            }
        });

        match lookup {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
            Some(None) => {
                if let Some((_, expired)) = self.entries.remove_if(key, |_, e| e.is_expired()) {
                    self.memory_usage.fetch_sub(expired.size, Ordering::Relaxed);
                    self.expired_cleanups.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let entry = CacheEntry::new(key, value.to_vec(), ttl);
        let entry_size = entry.size;

        // Replacing an entry frees its slot first
        self.remove_entry(key);
        self.evict_if_needed(entry_size)?;

        if let Some(old_entry) = self.entries.insert(key.to_string(), entry) {
            // Lost a race with a concurrent writer for the same key
            self.memory_usage.fetch_sub(old_entry.size, Ordering::Relaxed);
        }
        self.memory_usage.fetch_add(entry_size, Ordering::Relaxed);

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.remove_entry(key))
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        Ok(CacheStoreStats {
            entries: self.entries.len(),
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired_cleanups: self.expired_cleanups.load(Ordering::Relaxed),
            ..Default::default()
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(true)
    }
}
