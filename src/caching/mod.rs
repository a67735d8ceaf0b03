//! # Caching Module
//!
//! The cache-aside read path for typed documents.
//!
//! ## Architecture
//! 1. **Cache Clients**: string-keyed get / set-with-expiry adapters
//!    (`InMemoryCache`, `RedisCache`) behind the `CacheClient` trait
//! 2. **Cache Keys**: deterministic `{collection}:{scope}:{field}:{value}` keys,
//!    with a `neg:` prefix for negative entries
//! 3. **Lookup Cache**: negative-cache check, positive-cache check, store
//!    fallback, then fire-and-forget population of the cache
//!
//! ## Usage Example
//! ```ignore
//! let lookup = persistence.lookup::<Widget>()?;
//!
//! // First call falls through to the store and schedules population
//! let widget = lookup.get("code", "A1", false).await?;
//!
//! // Later calls are served from the cache until the TTL elapses
//! let widget = lookup.get("code", "A1", false).await?;
//!
//! // Misses can be remembered for the (shorter) negative TTL
//! assert!(lookup.get("code", "ZZ", true).await?.is_none());
//! ```

pub mod key_generator;
pub mod lookup;
pub mod stores;

pub use key_generator::{CacheKey, NEGATIVE_PREFIX};
pub use lookup::LookupCache;
pub use stores::{connect, CacheClient, CacheStoreStats, InMemoryCache, InMemoryCacheConfig, RedisCache, RedisCacheConfig};

/// Cache operation result
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache-specific error types
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache store error: {message}")]
    Store { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key generation error: {message}")]
    KeyGeneration { message: String },

    #[error("Cache operation timeout")]
    Timeout,

    #[error("Cache not available")]
    Unavailable,
}
