//! # Configuration Module
//!
//! Per-entity storage and cache settings, the cache backend selection and the
//! logging setup, loaded from YAML or JSON with environment overrides.
//!
//! ## Example
//! ```yaml
//! cache:
//!   backend: redis
//!   url: redis://localhost:6379
//!   operation_timeout: 500ms
//! entities:
//!   widgets:
//!     store_scope: main
//!     collection: widgets
//!     cache_ttl: 120s
//!     negative_cache_ttl: 60s
//! logging:
//!   level: info
//!   format: json
//! ```

use crate::caching::{InMemoryCacheConfig, RedisCacheConfig};
use crate::config_error;
use crate::core::error::{PersistError, PersistResult};
use crate::observability::config::{LogConfig, LogFormat};
use crate::store::Namespace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default lifetime of a positive cache entry
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(120);

/// Default lifetime of a negative cache entry
pub const DEFAULT_NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Storage location and cache lifetimes for one entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Database the collection lives in
    pub store_scope: String,

    /// Collection name, also the first segment of cache keys
    pub collection: String,

    /// How long a found document stays cached
    #[serde(with = "humantime_serde", default = "default_cache_ttl")]
    pub cache_ttl: Duration,

    /// How long a "no such document" answer stays cached
    #[serde(with = "humantime_serde", default = "default_negative_cache_ttl")]
    pub negative_cache_ttl: Duration,
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_negative_cache_ttl() -> Duration {
    DEFAULT_NEGATIVE_CACHE_TTL
}

impl EntityConfig {
    pub fn new<S: Into<String>, C: Into<String>>(store_scope: S, collection: C) -> Self {
        Self {
            store_scope: store_scope.into(),
            collection: collection.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            negative_cache_ttl: DEFAULT_NEGATIVE_CACHE_TTL,
        }
    }

    pub fn with_ttls(mut self, cache_ttl: Duration, negative_cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self.negative_cache_ttl = negative_cache_ttl;
        self
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.store_scope.clone(), self.collection.clone())
    }

    /// Problems with this entry, prefixed by the entity name
    pub fn validate(&self, name: &str) -> Vec<String> {
        let mut errors = Vec::new();

        for (field, value) in [("store_scope", &self.store_scope), ("collection", &self.collection)] {
            if value.is_empty() {
                errors.push(format!("entities.{}.{} cannot be empty", name, field));
            } else if value.contains(':') {
                errors.push(format!("entities.{}.{} cannot contain ':'", name, field));
            }
        }

        if self.cache_ttl.is_zero() {
            errors.push(format!("entities.{}.cache_ttl must be greater than 0", name));
        }
        if self.negative_cache_ttl.is_zero() {
            errors.push(format!("entities.{}.negative_cache_ttl must be greater than 0", name));
        }

        errors
    }
}

/// Which cache client to build
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CacheBackendConfig {
    Memory(InMemoryCacheConfig),
    Redis(RedisCacheConfig),
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self::Memory(InMemoryCacheConfig::default())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Cache backend settings
    #[serde(default)]
    pub cache: CacheBackendConfig,

    /// Entity settings keyed by `Entity::ENTITY_TYPE`
    #[serde(default)]
    pub entities: HashMap<String, EntityConfig>,

    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,
}

impl PersistenceConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PersistError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: PersistenceConfig = serde_yaml::from_str(&content)
            .map_err(|e| PersistError::config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from JSON
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> PersistResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PersistError::config(format!("Failed to read config file: {}", e)))?;

        let mut config: PersistenceConfig = serde_json::from_str(&content)
            .map_err(|e| PersistError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Register or replace the settings of one entity type
    pub fn with_entity<S: Into<String>>(mut self, entity_type: S, config: EntityConfig) -> Self {
        self.entities.insert(entity_type.into(), config);
        self
    }

    /// Settings of one entity type
    pub fn entity(&self, entity_type: &str) -> PersistResult<&EntityConfig> {
        self.entities
            .get(entity_type)
            .ok_or_else(|| PersistError::UnknownEntity {
                entity_type: entity_type.to_string(),
            })
    }

    /// Apply environment variable overrides to configuration
    ///
    /// Environment variables follow the pattern `DOCCACHE_<FIELD>`, for example
    /// `DOCCACHE_REDIS_URL=redis://cache:6379` or `DOCCACHE_CACHE_TTL=5m`.
    pub fn apply_env_overrides(&mut self) -> PersistResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, var: F) -> PersistResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = var("DOCCACHE_CACHE_BACKEND") {
            self.cache = match (backend.to_lowercase().as_str(), &self.cache) {
                ("memory", CacheBackendConfig::Memory(_)) | ("redis", CacheBackendConfig::Redis(_)) => self.cache.clone(),
                ("memory", _) => CacheBackendConfig::Memory(InMemoryCacheConfig::default()),
                ("redis", _) => CacheBackendConfig::Redis(RedisCacheConfig::default()),
                (other, _) => {
                    return Err(config_error!("Invalid DOCCACHE_CACHE_BACKEND: {}", other));
                }
            };
        }

        // A Redis URL implies the Redis backend
        if let Some(url) = var("DOCCACHE_REDIS_URL") {
            match &mut self.cache {
                CacheBackendConfig::Redis(redis) => redis.url = url,
                CacheBackendConfig::Memory(_) => {
                    self.cache = CacheBackendConfig::Redis(RedisCacheConfig {
                        url,
                        ..Default::default()
                    })
                }
            }
        }

        if let Some(ttl) = var("DOCCACHE_CACHE_TTL") {
            let ttl = humantime::parse_duration(&ttl)
                .map_err(|e| PersistError::config(format!("Invalid DOCCACHE_CACHE_TTL: {}", e)))?;
            for entity in self.entities.values_mut() {
                entity.cache_ttl = ttl;
            }
        }

        if let Some(ttl) = var("DOCCACHE_NEG_CACHE_TTL") {
            let ttl = humantime::parse_duration(&ttl)
                .map_err(|e| PersistError::config(format!("Invalid DOCCACHE_NEG_CACHE_TTL: {}", e)))?;
            for entity in self.entities.values_mut() {
                entity.negative_cache_ttl = ttl;
            }
        }

        if let Some(level) = var("DOCCACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = var("DOCCACHE_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => return Err(config_error!("Invalid DOCCACHE_LOG_FORMAT: {}", other)),
            };
        }

        Ok(())
    }

    /// Configuration validation collecting every problem into one error
    pub fn validate(&self) -> PersistResult<()> {
        let mut errors = Vec::new();

        for (name, entity) in &self.entities {
            errors.extend(entity.validate(name));
        }

        // Two entity types sharing a namespace would share cache keys
        let mut seen: HashMap<Namespace, &str> = HashMap::new();
        for (name, entity) in &self.entities {
            if let Some(other) = seen.insert(entity.namespace(), name) {
                errors.push(format!("entities.{} and entities.{} use the same collection {}", other, name, entity.namespace()));
            }
        }

        match &self.cache {
            CacheBackendConfig::Memory(memory) => {
                if memory.max_entries == 0 {
                    errors.push("cache.max_entries must be greater than 0".to_string());
                }
                if memory.max_memory_bytes == 0 {
                    errors.push("cache.max_memory_bytes must be greater than 0".to_string());
                }
                if memory.cleanup_interval.is_zero() {
                    errors.push("cache.cleanup_interval must be greater than 0".to_string());
                }
            }
            CacheBackendConfig::Redis(redis) => {
                if !(redis.url.starts_with("redis://") || redis.url.starts_with("rediss://") || redis.url.starts_with("redis+unix://")) {
                    errors.push(format!("cache.url is not a Redis URL: {}", redis.url));
                }
                if redis.operation_timeout.is_zero() {
                    errors.push("cache.operation_timeout must be greater than 0".to_string());
                }
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.to_lowercase().as_str()) {
            errors.push(format!("logging.level is invalid: {}", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            // Sorted so the message does not depend on map iteration order
            errors.sort();
            Err(PersistError::config(errors.join("; ")))
        }
    }
}
