//! # Cache Key Generator
//!
//! Deterministic keys for lookup entries. A key combines the collection, the
//! store scope, the lookup field and the lookup value:
//!
//! ```text
//! widgets:main:code:A1        positive entry
//! neg:widgets:main:code:A1    negative entry
//! ```
//!
//! Collection and scope names are validated to contain no `:` (see
//! `EntityConfig::validate`) and lookup fields are rejected here if they do,
//! so keys of distinct entity types, scopes or fields can never collide.

use super::{CacheError, CacheResult};
use crate::core::config::EntityConfig;
use std::fmt;

/// Prefix marking a negative-cache entry
pub const NEGATIVE_PREFIX: &str = "neg:";

/// Key of a positive lookup entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(collection: &str, store_scope: &str, field: &str, value: &str) -> CacheResult<Self> {
        if field.is_empty() {
            return Err(CacheError::KeyGeneration {
                message: "Lookup field cannot be empty".to_string(),
            });
        }
        if field.contains(':') {
            return Err(CacheError::KeyGeneration {
                message: format!("Lookup field cannot contain ':': {}", field),
            });
        }
        Ok(Self(format!("{}:{}:{}:{}", collection, store_scope, field, value)))
    }

    /// Key for a lookup against the entity type described by `config`
    pub fn for_entity(config: &EntityConfig, field: &str, value: &str) -> CacheResult<Self> {
        Self::new(&config.collection, &config.store_scope, field, value)
    }

    /// Key of the matching negative-cache entry
    pub fn negative(&self) -> String {
        format!("{}{}", NEGATIVE_PREFIX, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
