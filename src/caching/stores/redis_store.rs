//! # Redis Cache Client
//!
//! A Redis-backed cache client with a managed connection, bounded retries and
//! a per-operation timeout. Expiry is delegated to Redis (`SET .. PX`).

use super::{CacheClient, CacheStoreStats};
use crate::caching::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisCacheConfig {
    /// Redis connection URL
    pub url: String,

    /// Key prefix for all cache entries
    pub key_prefix: String,

    /// Upper bound for a single Redis round trip
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Maximum number of retries after a failed operation
    pub max_retries: u32,

    /// Retry delay, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            operation_timeout: Duration::from_secs(1),
            max_retries: 2,
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// Redis cache implementation
pub struct RedisCache {
    /// Configuration
    config: RedisCacheConfig,

    /// Redis connection manager, replaced only on reconnect
    connection_manager: Arc<RwLock<ConnectionManager>>,

    /// Statistics counters
    hits: AtomicU64,
    misses: AtomicU64,
    connection_errors: AtomicU64,
    timeouts: AtomicU64,
}

impl RedisCache {
    /// Create a new Redis cache
    pub async fn new(config: RedisCacheConfig) -> CacheResult<Self> {
        let connection_manager = Self::open(&config).await?;

        info!("Redis cache connected to {}", config.url);

        Ok(Self {
            config,
            connection_manager: Arc::new(RwLock::new(connection_manager)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        })
    }

    async fn open(config: &RedisCacheConfig) -> CacheResult<ConnectionManager> {
        let client = Client::open(config.url.as_str())?;
        match tokio::time::timeout(config.operation_timeout, ConnectionManager::new(client)).await {
            Ok(manager) => Ok(manager?),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    /// Get the full cache key with prefix
    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Execute a Redis operation with timeout and retry logic
    async fn execute_with_retry<F, T>(&self, operation: F) -> CacheResult<T>
    where
        F: Fn(&mut ConnectionManager) -> std::pin::Pin<Box<dyn std::future::Future<Output = RedisResult<T>> + Send + '_>> + Send + Sync,
        T: Send,
    {
        let mut retries = 0;

        loop {
            // The manager multiplexes one connection; each call works on its own handle
            let mut conn = self.connection_manager.read().await.clone();

            let failure = match tokio::time::timeout(self.config.operation_timeout, operation(&mut conn)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    error!("Redis operation failed: {}", e);
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);
                    CacheError::Redis(e)
                }
                Err(_) => {
                    warn!("Redis operation timed out after {:?}", self.config.operation_timeout);
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                    CacheError::Timeout
                }
            };

            if retries >= self.config.max_retries {
                return Err(failure);
            }

            retries += 1;
            tokio::time::sleep(self.config.retry_delay * retries).await;

            if let Err(reconnect_err) = self.reconnect().await {
                warn!("Failed to reconnect to Redis: {}", reconnect_err);
            }
        }
    }

    /// Reconnect to Redis
    async fn reconnect(&self) -> CacheResult<()> {
        let new_connection_manager = Self::open(&self.config).await?;

        let mut conn = self.connection_manager.write().await;
        *conn = new_connection_manager;

        info!("Reconnected to Redis");
        Ok(())
    }
}

#[async_trait]
impl CacheClient for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let full_key = self.full_key(key);

        let result = self
            .execute_with_retry(|conn| {
                let full_key = full_key.clone();
                Box::pin(async move { conn.get::<_, Option<Vec<u8>>>(&full_key).await })
            })
            .await?;

        match result {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache hit for key: {}", key);
                Ok(Some(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Redis cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let full_key = self.full_key(key);
        let ttl_millis = ttl.as_millis().max(1) as u64;
        let value = value.to_vec();

        self.execute_with_retry(|conn| {
            let full_key = full_key.clone();
            let value = value.clone();
            Box::pin(async move {
                redis::cmd("SET")
                    .arg(&full_key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis)
                    .query_async::<_, ()>(conn)
                    .await
            })
        })
        .await?;

        debug!("Set Redis cache key: {} with TTL: {:?}", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let full_key = self.full_key(key);

        let deleted_count: i64 = self
            .execute_with_retry(|conn| {
                let full_key = full_key.clone();
                Box::pin(async move { conn.del(&full_key).await })
            })
            .await?;

        Ok(deleted_count > 0)
    }

    async fn stats(&self) -> CacheResult<CacheStoreStats> {
        let key_count: usize = self
            .execute_with_retry(|conn| Box::pin(async move { redis::cmd("DBSIZE").query_async(conn).await }))
            .await?;

        Ok(CacheStoreStats {
            entries: key_count,
            memory_usage: 0,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,        // Redis handles eviction internally
            expired_cleanups: 0, // Redis handles TTL cleanup internally
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        })
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let result = self
            .execute_with_retry(|conn| Box::pin(async move { redis::cmd("PING").query_async::<_, String>(conn).await }))
            .await;

        match result {
            Ok(response) => Ok(response == "PONG"),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    async fn setup_redis_cache() -> RedisCache {
        let config = RedisCacheConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: format!("document-cache-test:{}:", uuid::Uuid::new_v4()),
            ..Default::default()
        };
        RedisCache::new(config).await.unwrap()
    }

    #[test]
    fn test_config_from_yaml() {
        let config: RedisCacheConfig =
            serde_yaml::from_str("url: redis://cache:6379\noperation_timeout: 250ms\n").unwrap();
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.operation_timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, 2);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis server at REDIS_URL
    async fn test_basic_operations() {
        let cache = setup_redis_cache().await;

        cache.set("test_key", b"test_value", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("test_key").await.unwrap(), Some(b"test_value".to_vec()));

        assert!(cache.delete("test_key").await.unwrap());
        assert_eq!(cache.get("test_key").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis server at REDIS_URL
    async fn test_ttl_expiration() {
        let cache = setup_redis_cache().await;

        cache.set("expire_test", b"expire_value", Duration::from_millis(200)).await.unwrap();
        assert!(cache.get("expire_test").await.unwrap().is_some());

        sleep(Duration::from_millis(400)).await;
        assert_eq!(cache.get("expire_test").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis server at REDIS_URL
    async fn test_concurrent_operations_do_not_serialize() {
        let cache = Arc::new(setup_redis_cache().await);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = format!("concurrent_{}", i);
                    cache.set(&key, b"value", Duration::from_secs(60)).await.unwrap();
                    cache.get(&key).await.unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(b"value".to_vec()));
        }

        // Each task ran its round trips on a shared manager without a held guard
        assert!(cache.connection_manager.try_write().is_ok());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 16);
        assert_eq!(stats.connection_errors, 0);
        assert_eq!(stats.timeouts, 0);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis server at REDIS_URL
    async fn test_health_check() {
        let cache = setup_redis_cache().await;
        assert!(cache.health_check().await.unwrap());
    }
}
