//! # Cache Client Adapters
//!
//! String-keyed get / set-with-expiry over byte payloads. Absence is signalled
//! by `Ok(None)` (an empty payload is treated the same by the lookup path),
//! never by an error.

pub mod memory;
pub mod redis_store;

pub use memory::{InMemoryCache, InMemoryCacheConfig};
pub use redis_store::{RedisCache, RedisCacheConfig};

use super::CacheResult;
use crate::core::config::CacheBackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Trait for cache client implementations
#[async_trait]
pub trait CacheClient: Send + Sync {
    /// Get a value from the cache
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set a value in the cache with TTL
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Delete a value from the cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Get cache statistics
    async fn stats(&self) -> CacheResult<CacheStoreStats>;

    /// Perform health check
    async fn health_check(&self) -> CacheResult<bool>;
}

/// Cache client statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStoreStats {
    /// Number of entries
    pub entries: usize,

    /// Total memory usage in bytes
    pub memory_usage: usize,

    /// Number of hits
    pub hits: u64,

    /// Number of misses
    pub misses: u64,

    /// Number of evictions
    pub evictions: u64,

    /// Number of expired entries cleaned up
    pub expired_cleanups: u64,

    /// Number of failed backend round trips
    pub connection_errors: u64,

    /// Number of backend round trips that hit the operation timeout
    pub timeouts: u64,
}

/// Build the cache client selected by configuration
pub async fn connect(config: &CacheBackendConfig) -> CacheResult<Arc<dyn CacheClient>> {
    match config {
        CacheBackendConfig::Memory(memory) => {
            info!("In-memory cache initialized with max {} entries", memory.max_entries);
            Ok(Arc::new(InMemoryCache::new(memory.clone())))
        }
        CacheBackendConfig::Redis(redis) => {
            let cache = RedisCache::new(redis.clone()).await?;
            Ok(Arc::new(cache))
        }
    }
}
