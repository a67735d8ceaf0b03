//! # Document Cache Library
//!
//! A persistence layer for typed documents: validated create / update / delete
//! through a document store, and a cache-aside lookup path with negative
//! caching and asynchronous population in front of it.
//!
//! ## Quick Start
//! ```ignore
//! let config = PersistenceConfig::load_from_file("config/document-cache.yaml").await?;
//! init_logging(&config.logging)?;
//!
//! let persistence = Persistence::connect(config, Arc::new(InMemoryStore::new())).await?;
//!
//! let repository = persistence.repository::<Widget>()?;
//! let mut widget = Widget::new("A1");
//! repository.create(&mut widget).await?;
//!
//! let lookup = persistence.lookup::<Widget>()?;
//! let found = lookup.get("code", "A1", true).await?;
//! ```
//!
//! Repository mutations do not invalidate cached lookups; entries stay until
//! their TTL elapses.

/// Error types and configuration
pub mod core;

/// The entity contract and field validation
pub mod entity;

/// Document store adapter and its in-memory implementation
pub mod store;

/// Cache clients, cache keys and the lookup cache
pub mod caching;

/// Validated persistence operations per entity type
pub mod repository;

/// Wiring of repositories and lookup caches from configuration
pub mod persistence;

/// Logging setup
pub mod observability;

/// Entity definitions
pub mod models;

pub use caching::{CacheClient, CacheError, CacheKey, InMemoryCache, LookupCache, RedisCache};
pub use core::config::{CacheBackendConfig, EntityConfig, PersistenceConfig};
pub use core::error::{PersistError, PersistResult};
pub use entity::{Entity, EntityId, EntityMeta, ValidationError, Validator};
pub use observability::{init_logging, LogConfig, LogFormat};
pub use persistence::Persistence;
pub use repository::Repository;
pub use store::{DocumentStore, Filter, InMemoryStore, Namespace, StoreError, UpdateDocument};
