//! # Entity Contract
//!
//! The generic shape every persisted document satisfies: an immutable
//! identifier, creation and update timestamps, and field validation.
//!
//! ## Relationships
//! - *Belongs-to* references are plain `EntityId` fields (`Option<EntityId>` for
//!   zero-or-one, `Vec<EntityId>` for zero-or-many).
//! - *Embeddable* projections (`Option<Box<T>>`, `Vec<T>`) are read-side views
//!   filled by aggregation. They are listed in `Entity::embedded_fields`, must be
//!   `#[serde(default)]`, and are stripped from the stored document so the owner
//!   never duplicates another entity's persisted fields.
//!
//! Identity and timestamps are owned by the `Repository`; callers never set them.

pub mod validation;

pub use validation::{FieldError, ValidationError, Validator};

use crate::store::{Document, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque unique identifier of a persisted document
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_string(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id has not been assigned by a repository yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity and timestamps present on every entity
///
/// Entities embed this with `#[serde(flatten)]` so the stored and cached forms
/// carry `_id`, `created_at` and `updated_at` as top-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMeta {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityMeta {
    /// Stamp a fresh identity, with both timestamps set to `now`
    pub(crate) fn assign(&mut self, now: DateTime<Utc>) {
        self.id = EntityId::generate();
        self.created_at = now;
        self.updated_at = now;
    }

    /// Whether the entity has been through `Repository::create`
    pub fn is_persisted(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Contract for a persisted document type
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Name used to look up this type's `EntityConfig`
    const ENTITY_TYPE: &'static str;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Entity-specific defaults, applied by `Repository::create` before validation
    fn apply_defaults(&mut self) {}

    /// Structural and field-level checks
    fn validate(&self) -> Result<(), ValidationError>;

    /// Fields populated only by read-side aggregation, never persisted
    fn embedded_fields() -> &'static [&'static str] {
        &[]
    }

    fn id(&self) -> &EntityId {
        &self.meta().id
    }
}

/// Run the shared identity checks together with the entity's own rules
pub fn validate_entity<E: Entity>(entity: &E) -> Result<(), ValidationError> {
    let meta_result = Validator::new(E::ENTITY_TYPE).meta(entity.meta()).finish();
    match (meta_result, entity.validate()) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(meta), Err(fields)) => Err(meta.merge(fields)),
    }
}

/// Storage representation of an entity, with embedded views removed
pub fn to_document<E: Entity>(entity: &E) -> StoreResult<Document> {
    match serde_json::to_value(entity)? {
        serde_json::Value::Object(mut doc) => {
            for field in E::embedded_fields() {
                doc.remove(*field);
            }
            Ok(doc)
        }
        other => Err(StoreError::backend(format!(
            "{} serialized to a non-object value: {}",
            E::ENTITY_TYPE,
            other
        ))),
    }
}

/// Rebuild an entity from its stored document
pub fn from_document<E: Entity>(doc: Document) -> StoreResult<E> {
    Ok(serde_json::from_value(serde_json::Value::Object(doc))?)
}
