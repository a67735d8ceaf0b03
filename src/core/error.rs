//! # Error Handling Module
//!
//! Top-level error type for the persistence layer, built with `thiserror`.
//!
//! Each layer owns its own error enum (`ValidationError` for the entity
//! contract, `StoreError` for the document store adapter, `CacheError` for
//! the cache client adapter). `PersistError` wraps them so that callers of the
//! repository and the lookup cache handle a single type, while still being able
//! to match on the layer that failed.
//!
//! "Not found" is not an error on the lookup path: `LookupCache::get` returns
//! `Ok(None)` for it. `StoreError::NotFound` only surfaces from mutations that
//! target an id which no longer exists.

use crate::caching::CacheError;
use crate::entity::ValidationError;
use crate::store::StoreError;
use thiserror::Error;

/// Main result type used throughout the crate
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors surfaced by repositories, lookup caches and configuration loading
#[derive(Debug, Error)]
pub enum PersistError {
    /// Entity failed its field constraints; storage was never touched
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Document store unreachable, write conflict or other backend failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache client unreachable or cached payload malformed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No `EntityConfig` registered for the requested entity type
    #[error("No configuration registered for entity type: {entity_type}")]
    UnknownEntity { entity_type: String },
}

impl PersistError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error came from the document store reporting a missing document
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Cache(CacheError::Timeout) | Self::Cache(CacheError::Unavailable) => true,
            Self::Cache(CacheError::Redis(_)) => true,
            _ => false,
        }
    }

    /// Get a string representation of the error type for logs and metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Store(_) => "store_error",
            Self::Cache(_) => "cache_error",
            Self::Configuration { .. } => "configuration_error",
            Self::UnknownEntity { .. } => "unknown_entity",
        }
    }
}

impl From<serde_yaml::Error> for PersistError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::config(format!("YAML error: {}", err))
    }
}

/// Convenience macro for creating configuration errors
///
/// Usage: `config_error!("Invalid TTL for {}: {}", name, ttl)`
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::core::error::PersistError::config(format!($($arg)*))
    };
}
