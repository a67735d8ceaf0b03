//! # Repository
//!
//! Validated create / update / delete for one entity type against a
//! `DocumentStore`, plus the read-side queries the lookup cache and
//! relationship aggregation build on.
//!
//! Mutations go straight to the store. They do not purge or refresh cache
//! entries already populated for the entity, so lookups may serve the previous
//! snapshot until its TTL elapses.

use crate::core::config::EntityConfig;
use crate::core::error::PersistResult;
use crate::entity::{self, Entity, EntityId, ValidationError};
use crate::store::{DocumentStore, Filter, Namespace, StoreError, UpdateDocument};
use chrono::Utc;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

/// Persistence operations for entity type `E`
pub struct Repository<E: Entity> {
    store: Arc<dyn DocumentStore>,
    config: Arc<EntityConfig>,
    namespace: Namespace,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            namespace: self.namespace.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> std::fmt::Debug for Repository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("config", &self.config)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn DocumentStore>, config: EntityConfig) -> Self {
        let namespace = config.namespace();
        Self {
            store,
            config: Arc::new(config),
            namespace,
            _entity: PhantomData,
        }
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Identity and field checks without touching storage
    pub fn validate(&self, entity: &E) -> Result<(), ValidationError> {
        entity::validate_entity(entity)
    }

    /// Assign identity and timestamps, apply defaults, validate, then insert
    pub async fn create(&self, entity: &mut E) -> PersistResult<()> {
        entity.meta_mut().assign(Utc::now());
        entity.apply_defaults();

        self.validate(entity)?;

        let doc = entity::to_document(entity)?;
        self.store.insert(&self.namespace, doc).await?;

        info!(
            entity_type = E::ENTITY_TYPE,
            id = %entity.id(),
            "Created {} document",
            E::ENTITY_TYPE
        );
        Ok(())
    }

    /// Stamp `updated_at`, merge it into the patch's `$set`, validate, then apply
    ///
    /// The patch is otherwise passed to the store as-is: field assignments must
    /// already be framed in an operator such as `$set`. Patches touching the
    /// timestamps or an embedded view are rejected before anything changes.
    pub async fn update(&self, entity: &mut E, mut patch: UpdateDocument) -> PersistResult<()> {
        check_patch::<E>(&patch)?;

        // Never move updated_at behind created_at, even under clock skew
        let now = Utc::now().max(entity.meta().created_at);
        entity.meta_mut().updated_at = now;
        patch.merge_set("updated_at", serde_json::to_value(now).map_err(StoreError::from)?)?;

        self.validate(entity)?;

        self.store.update_by_id(&self.namespace, entity.id(), &patch).await?;

        debug!(entity_type = E::ENTITY_TYPE, id = %entity.id(), "Updated document");
        Ok(())
    }

    /// Remove the entity's document
    pub async fn delete(&self, entity: &E) -> PersistResult<()> {
        self.store.delete_by_id(&self.namespace, entity.id()).await?;

        info!(entity_type = E::ENTITY_TYPE, id = %entity.id(), "Deleted document");
        Ok(())
    }

    /// First entity whose `field` equals `value`, bypassing any cache
    pub async fn find_one<V: Into<Value>>(&self, field: &str, value: V) -> PersistResult<Option<E>> {
        self.find(&Filter::eq(field, value)).await
    }

    pub async fn find_by_id(&self, id: &EntityId) -> PersistResult<Option<E>> {
        self.find(&Filter::by_id(id)).await
    }

    /// Resolve belongs-to references into entities, skipping ids that no longer exist
    pub async fn find_by_ids(&self, ids: &[EntityId]) -> PersistResult<Vec<E>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.find_by_id(id).await? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    async fn find(&self, filter: &Filter) -> PersistResult<Option<E>> {
        match self.store.find_one(&self.namespace, filter).await {
            Ok(doc) => Ok(Some(entity::from_document(doc)?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Paths the repository owns or that are never persisted
fn check_patch<E: Entity>(patch: &UpdateDocument) -> Result<(), StoreError> {
    for (operator, fields) in patch.as_document() {
        let Some(fields) = fields.as_object() else {
            continue;
        };
        for path in fields.keys() {
            let root = path.split('.').next().unwrap_or(path);
            if root == "created_at" || root == "updated_at" {
                return Err(StoreError::invalid_update(format!(
                    "{} {} is managed by the repository",
                    operator, root
                )));
            }
            if E::embedded_fields().iter().any(|field| *field == root) {
                return Err(StoreError::invalid_update(format!(
                    "{} {} is an embedded view and is never stored",
                    operator, root
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PersistError;
    use crate::models::Widget;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<InMemoryStore>, Repository<Widget>) {
        let store = Arc::new(InMemoryStore::new());
        let repo = Repository::new(store.clone(), EntityConfig::new("main", "widgets"));
        (store, repo)
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_defaults() {
        let (store, repo) = setup();
        let mut widget = Widget::new("A1");

        repo.create(&mut widget).await.unwrap();

        assert!(!widget.meta.id.is_empty());
        assert_eq!(widget.meta.created_at, widget.meta.updated_at);
        assert_eq!(widget.field_with_default, 7);
        assert_eq!(store.stats().inserts, 1);

        let found = repo.find_by_id(&widget.meta.id).await.unwrap().unwrap();
        assert_eq!(found, widget);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_without_store_access() {
        let (store, repo) = setup();
        let mut widget = Widget::new("");

        let err = repo.create(&mut widget).await.unwrap_err();
        assert!(matches!(err, PersistError::Validation(ref v) if v.has_field("code")));
        assert_eq!(store.stats().inserts, 0);
    }

    struct UnavailableStore;

    #[async_trait::async_trait]
    impl DocumentStore for UnavailableStore {
        async fn insert(&self, _ns: &Namespace, _doc: crate::store::Document) -> crate::store::StoreResult<()> {
            Err(StoreError::backend("connection refused"))
        }

        async fn find_one(&self, _ns: &Namespace, _filter: &Filter) -> crate::store::StoreResult<crate::store::Document> {
            Err(StoreError::Timeout)
        }

        async fn update_by_id(&self, _ns: &Namespace, _id: &EntityId, _patch: &UpdateDocument) -> crate::store::StoreResult<()> {
            Err(StoreError::backend("connection refused"))
        }

        async fn delete_by_id(&self, _ns: &Namespace, _id: &EntityId) -> crate::store::StoreResult<()> {
            Err(StoreError::backend("connection refused"))
        }

        fn stats(&self) -> crate::store::StoreStats {
            crate::store::StoreStats::default()
        }
    }

    #[tokio::test]
    async fn test_store_errors_surface() {
        let repo: Repository<Widget> = Repository::new(Arc::new(UnavailableStore), EntityConfig::new("main", "widgets"));
        let mut widget = Widget::new("A1");

        let err = repo.create(&mut widget).await.unwrap_err();
        assert!(matches!(err, PersistError::Store(StoreError::Backend { .. })));
        assert!(err.is_retryable());

        let err = repo.find_one("code", "A1").await.unwrap_err();
        assert!(matches!(err, PersistError::Store(StoreError::Timeout)));
    }

    #[tokio::test]
    async fn test_update_stamps_updated_at_into_set() {
        let (_store, repo) = setup();
        let mut widget = Widget::new("A1");
        repo.create(&mut widget).await.unwrap();
        let created_at = widget.meta.created_at;

        let patch = UpdateDocument::from_value(json!({"$set": {"code": "A2"}})).unwrap();
        repo.update(&mut widget, patch).await.unwrap();

        assert!(widget.meta.updated_at >= created_at);
        let stored = repo.find_by_id(&widget.meta.id).await.unwrap().unwrap();
        assert_eq!(stored.code, "A2");
        assert_eq!(stored.meta.updated_at, widget.meta.updated_at);
        assert_eq!(stored.meta.created_at, created_at);
    }

    #[tokio::test]
    async fn test_update_adds_set_when_patch_has_none() {
        let (_store, repo) = setup();
        let mut widget = Widget::new("A1");
        repo.create(&mut widget).await.unwrap();

        let patch = UpdateDocument::new().inc("field_with_default", 1);
        repo.update(&mut widget, patch).await.unwrap();

        let stored = repo.find_by_id(&widget.meta.id).await.unwrap().unwrap();
        assert_eq!(stored.field_with_default, 8);
        assert_eq!(stored.meta.updated_at, widget.meta.updated_at);
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_without_store_access() {
        let (store, repo) = setup();
        let mut widget = Widget::new("A1");
        repo.create(&mut widget).await.unwrap();

        widget.field_with_default = 42;
        let err = repo.update(&mut widget, UpdateDocument::new().set("field_with_default", 42)).await.unwrap_err();
        assert!(matches!(err, PersistError::Validation(_)));
        assert_eq!(store.stats().updates, 0);
    }

    #[tokio::test]
    async fn test_update_rejects_managed_and_embedded_paths() {
        let (store, repo) = setup();
        let mut widget = Widget::new("A1");
        repo.create(&mut widget).await.unwrap();
        let before = widget.meta.clone();

        for patch in [
            UpdateDocument::new().unset("created_at"),
            UpdateDocument::new().set("updated_at", "2000-01-01T00:00:00Z"),
            UpdateDocument::new().set("related_widget.code", "B1"),
            UpdateDocument::new().push("related_widgets", json!({"code": "C1"})),
        ] {
            let err = repo.update(&mut widget, patch).await.unwrap_err();
            assert!(matches!(err, PersistError::Store(StoreError::InvalidUpdate { .. })));
        }

        assert_eq!(widget.meta, before);
        assert_eq!(store.stats().updates, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, repo) = setup();
        let mut widget = Widget::new("A1");
        repo.create(&mut widget).await.unwrap();

        repo.delete(&widget).await.unwrap();
        assert!(repo.find_by_id(&widget.meta.id).await.unwrap().is_none());

        let err = repo.delete(&widget).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.stats().deletes, 2);
    }

    #[tokio::test]
    async fn test_find_by_ids_skips_missing() {
        let (_store, repo) = setup();
        let mut a = Widget::new("A1");
        let mut b = Widget::new("B1");
        repo.create(&mut a).await.unwrap();
        repo.create(&mut b).await.unwrap();

        let ids = vec![a.meta.id.clone(), EntityId::generate(), b.meta.id.clone()];
        let found = repo.find_by_ids(&ids).await.unwrap();
        assert_eq!(found, vec![a, b]);
    }
}
