//! A reference entity exercising every relationship shape: a defaulted,
//! range-checked field, belongs-to references, and embeddable projections.

use crate::core::error::PersistResult;
use crate::entity::{Entity, EntityId, EntityMeta, ValidationError, Validator};
use crate::repository::Repository;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    #[serde(flatten)]
    pub meta: EntityMeta,

    /// Secondary lookup key
    pub code: String,

    /// Set to 7 on create; must stay strictly between 2 and 10
    #[serde(default)]
    pub field_with_default: i32,

    /// Belongs to at most one other widget
    #[serde(default)]
    pub related_widget_id: Option<EntityId>,

    /// Belongs to any number of other widgets
    #[serde(default)]
    pub related_widget_ids: Vec<EntityId>,

    // Embeddables, filled by `load_related` and never stored
    #[serde(default)]
    pub related_widget: Option<Box<Widget>>,

    #[serde(default)]
    pub related_widgets: Vec<Widget>,
}

impl Widget {
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self {
            meta: EntityMeta::default(),
            code: code.into(),
            field_with_default: 0,
            related_widget_id: None,
            related_widget_ids: Vec::new(),
            related_widget: None,
            related_widgets: Vec::new(),
        }
    }

    /// Resolve the belongs-to references into the embeddable views
    pub async fn load_related(&mut self, repository: &Repository<Widget>) -> PersistResult<()> {
        self.related_widget = match &self.related_widget_id {
            Some(id) => repository.find_by_id(id).await?.map(Box::new),
            None => None,
        };
        self.related_widgets = repository.find_by_ids(&self.related_widget_ids).await?;
        Ok(())
    }
}

impl Entity for Widget {
    const ENTITY_TYPE: &'static str = "widgets";

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }

    fn apply_defaults(&mut self) {
        self.field_with_default = 7;
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Validator::new(Self::ENTITY_TYPE)
            .required("code", &self.code)
            .max_len("code", &self.code, 64)
            .range_exclusive("field_with_default", self.field_with_default, 2, 10)
            .finish()
    }

    fn embedded_fields() -> &'static [&'static str] {
        &["related_widget", "related_widgets"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EntityConfig;
    use crate::entity::{to_document, validate_entity};
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn test_field_rules() {
        let mut widget = Widget::new("");
        widget.field_with_default = 10;

        let err = widget.validate().unwrap_err();
        assert!(err.has_field("code"));
        assert!(err.has_field("field_with_default"));

        widget.code = "A1".to_string();
        widget.apply_defaults();
        assert!(widget.validate().is_ok());
    }

    #[test]
    fn test_unsaved_widget_fails_identity_checks() {
        let mut widget = Widget::new("A1");
        widget.apply_defaults();

        let err = validate_entity(&widget).unwrap_err();
        assert!(err.has_field("_id"));

        widget.meta.assign(Utc::now());
        assert!(validate_entity(&widget).is_ok());
    }

    #[test]
    fn test_embedded_views_not_stored() {
        let mut widget = Widget::new("A1");
        widget.related_widget = Some(Box::new(Widget::new("B1")));
        widget.related_widgets = vec![Widget::new("C1")];

        let doc = to_document(&widget).unwrap();
        assert!(!doc.contains_key("related_widget"));
        assert!(!doc.contains_key("related_widgets"));
        assert!(doc.contains_key("related_widget_ids"));
    }

    #[tokio::test]
    async fn test_load_related() {
        let repo: Repository<Widget> =
            Repository::new(Arc::new(InMemoryStore::new()), EntityConfig::new("main", "widgets"));

        let mut parent = Widget::new("P1");
        let mut sibling = Widget::new("S1");
        repo.create(&mut parent).await.unwrap();
        repo.create(&mut sibling).await.unwrap();

        let mut child = Widget::new("C1");
        child.related_widget_id = Some(parent.meta.id.clone());
        child.related_widget_ids = vec![sibling.meta.id.clone(), EntityId::generate()];
        repo.create(&mut child).await.unwrap();

        let mut loaded = repo.find_one("code", "C1").await.unwrap().unwrap();
        assert!(loaded.related_widget.is_none());

        loaded.load_related(&repo).await.unwrap();
        assert_eq!(loaded.related_widget.as_deref(), Some(&parent));
        assert_eq!(loaded.related_widgets, vec![sibling]);
    }
}
