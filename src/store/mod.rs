//! # Document Store Adapter
//!
//! Abstracts the backing document database behind a collection-scoped
//! insert / find-one / update-by-id / delete-by-id interface.
//!
//! - Queries are single-field equality filters (`Filter`).
//! - Updates are operator documents (`UpdateDocument`) applied as-is. The
//!   adapter never wraps a patch in an implicit `$set`; callers frame their
//!   operators themselves.
//! - A missing document is reported as `StoreError::NotFound`, distinguishable
//!   from backend failures.

pub mod memory;

pub use memory::InMemoryStore;

use crate::entity::EntityId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// A stored document: field name to JSON value
pub type Document = Map<String, Value>;

/// Store operation result
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No matching document in {collection}")]
    NotFound { collection: String },

    #[error("Duplicate key {id} in {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("Invalid update document: {message}")]
    InvalidUpdate { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {message}")]
    Backend { message: String },

    #[error("Store operation timeout")]
    Timeout,
}

impl StoreError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn invalid_update<S: Into<String>>(message: S) -> Self {
        Self::InvalidUpdate {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout)
    }
}

/// Database scope plus collection name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub store_scope: String,
    pub collection: String,
}

impl Namespace {
    pub fn new<S: Into<String>, C: Into<String>>(store_scope: S, collection: C) -> Self {
        Self {
            store_scope: store_scope.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.store_scope, self.collection)
    }
}

/// Exact-match equality on a single field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq<F: Into<String>, V: Into<Value>>(field: F, value: V) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn by_id(id: &EntityId) -> Self {
        Self::eq("_id", id.as_str())
    }

    /// Whether a document satisfies the filter; dotted names reach into sub-documents
    pub fn matches(&self, doc: &Document) -> bool {
        lookup_path(doc, &self.field) == Some(&self.value)
    }
}

fn lookup_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Update-operator document, e.g. `{"$set": {"code": "A2"}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateDocument(Document);

impl UpdateDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a raw JSON object; the contents are not validated until applied
    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(doc) => Ok(Self(doc)),
            other => Err(StoreError::invalid_update(format!(
                "update must be an object, got {}",
                other
            ))),
        }
    }

    pub fn set<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.operator_entry("$set").insert(field.to_string(), value.into());
        self
    }

    pub fn unset(mut self, field: &str) -> Self {
        self.operator_entry("$unset").insert(field.to_string(), Value::from(""));
        self
    }

    pub fn inc<V: Into<Value>>(mut self, field: &str, by: V) -> Self {
        self.operator_entry("$inc").insert(field.to_string(), by.into());
        self
    }

    pub fn push<V: Into<Value>>(mut self, field: &str, value: V) -> Self {
        self.operator_entry("$push").insert(field.to_string(), value.into());
        self
    }

    /// Add a field assignment to `$set`, creating the operator if absent
    pub fn merge_set<V: Into<Value>>(&mut self, field: &str, value: V) -> StoreResult<()> {
        match self.0.entry("$set").or_insert_with(|| Value::Object(Map::new())) {
            Value::Object(set) => {
                set.insert(field.to_string(), value.into());
                Ok(())
            }
            other => Err(StoreError::invalid_update(format!(
                "$set must be an object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, operator: &str) -> Option<&Value> {
        self.0.get(operator)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn operator_entry(&mut self, operator: &str) -> &mut Document {
        let slot = self
            .0
            .entry(operator)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("operator slot was just replaced with an object"),
        }
    }
}

/// Operation counters for a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub inserts: u64,
    pub finds: u64,
    pub updates: u64,
    pub deletes: u64,
}

/// Trait for document store implementations
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document; fails if its `_id` already exists
    async fn insert(&self, ns: &Namespace, doc: Document) -> StoreResult<()>;

    /// First document matching the filter, or `StoreError::NotFound`
    async fn find_one(&self, ns: &Namespace, filter: &Filter) -> StoreResult<Document>;

    /// Apply an operator document to the document with this id
    async fn update_by_id(&self, ns: &Namespace, id: &EntityId, patch: &UpdateDocument) -> StoreResult<()>;

    /// Remove the document with this id
    async fn delete_by_id(&self, ns: &Namespace, id: &EntityId) -> StoreResult<()>;

    /// Operation counters since creation
    fn stats(&self) -> StoreStats;
}
