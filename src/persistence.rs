//! # Persistence
//!
//! Builds repositories and lookup caches for entity types from one
//! `PersistenceConfig`, sharing a single document store and cache client.

use crate::caching::{self, CacheClient, LookupCache};
use crate::core::config::{EntityConfig, PersistenceConfig};
use crate::core::error::PersistResult;
use crate::entity::Entity;
use crate::repository::Repository;
use crate::store::DocumentStore;
use std::sync::Arc;
use tracing::info;

/// Shared handles for every configured entity type
#[derive(Clone)]
pub struct Persistence {
    config: Arc<PersistenceConfig>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn CacheClient>,
}

impl Persistence {
    pub fn new(config: PersistenceConfig, store: Arc<dyn DocumentStore>, cache: Arc<dyn CacheClient>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            cache,
        }
    }

    /// Validate the configuration and open the configured cache backend
    pub async fn connect(config: PersistenceConfig, store: Arc<dyn DocumentStore>) -> PersistResult<Self> {
        config.validate()?;
        let cache = caching::connect(&config.cache).await?;

        info!(entities = config.entities.len(), "Persistence layer ready");
        Ok(Self::new(config, store, cache))
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheClient> {
        &self.cache
    }

    /// Settings registered for `E`, or `UnknownEntity`
    pub fn entity_config<E: Entity>(&self) -> PersistResult<&EntityConfig> {
        self.config.entity(E::ENTITY_TYPE)
    }

    pub fn repository<E: Entity>(&self) -> PersistResult<Repository<E>> {
        let config = self.entity_config::<E>()?.clone();
        Ok(Repository::new(self.store.clone(), config))
    }

    pub fn lookup<E: Entity>(&self) -> PersistResult<LookupCache<E>> {
        Ok(LookupCache::new(self.repository::<E>()?, self.cache.clone()))
    }

    /// Whether the cache backend answers
    pub async fn health_check(&self) -> PersistResult<bool> {
        Ok(self.cache.health_check().await?)
    }
}
