//! # In-Memory Document Store
//!
//! A process-local `DocumentStore` keyed by namespace. Each namespace holds its
//! documents behind one lock, so id-keyed updates and deletes are atomic the way
//! a real document database makes them. Update operators are applied to a copy
//! and committed only when every operator succeeds.

use super::{Document, DocumentStore, Filter, Namespace, StoreError, StoreResult, StoreStats, UpdateDocument};
use crate::entity::EntityId;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type Collection = Arc<RwLock<BTreeMap<String, Document>>>;

/// In-memory document store implementation
#[derive(Default)]
pub struct InMemoryStore {
    collections: DashMap<Namespace, Collection>,
    inserts: AtomicU64,
    finds: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored in a namespace
    pub fn count(&self, ns: &Namespace) -> usize {
        self.collections
            .get(ns)
            .map(|c| c.read().len())
            .unwrap_or(0)
    }

    fn collection(&self, ns: &Namespace) -> Collection {
        self.collections
            .entry(ns.clone())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
            .clone()
    }

    fn not_found(ns: &Namespace) -> StoreError {
        StoreError::NotFound {
            collection: ns.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, ns: &Namespace, doc: Document) -> StoreResult<()> {
        self.inserts.fetch_add(1, Ordering::Relaxed);

        let id = match doc.get("_id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            _ => return Err(StoreError::backend("document is missing a string _id")),
        };

        let collection = self.collection(ns);
        let mut docs = collection.write();
        if docs.contains_key(&id) {
            return Err(StoreError::DuplicateKey {
                collection: ns.to_string(),
                id,
            });
        }
        docs.insert(id.clone(), doc);

        debug!("Inserted document {} into {}", id, ns);
        Ok(())
    }

    async fn find_one(&self, ns: &Namespace, filter: &Filter) -> StoreResult<Document> {
        self.finds.fetch_add(1, Ordering::Relaxed);

        let collection = match self.collections.get(ns) {
            Some(c) => c.clone(),
            None => return Err(Self::not_found(ns)),
        };
        let docs = collection.read();

        // Fast path for identifier lookups
        if filter.field == "_id" {
            if let Value::String(id) = &filter.value {
                return docs.get(id).cloned().ok_or_else(|| Self::not_found(ns));
            }
        }

        docs.values()
            .find(|doc| filter.matches(doc))
            .cloned()
            .ok_or_else(|| Self::not_found(ns))
    }

    async fn update_by_id(&self, ns: &Namespace, id: &EntityId, patch: &UpdateDocument) -> StoreResult<()> {
        self.updates.fetch_add(1, Ordering::Relaxed);

        let collection = match self.collections.get(ns) {
            Some(c) => c.clone(),
            None => return Err(Self::not_found(ns)),
        };
        let mut docs = collection.write();
        let current = docs.get(id.as_str()).ok_or_else(|| Self::not_found(ns))?;

        let updated = apply_update(current, patch)?;
        docs.insert(id.as_str().to_string(), updated);

        debug!("Updated document {} in {}", id, ns);
        Ok(())
    }

    async fn delete_by_id(&self, ns: &Namespace, id: &EntityId) -> StoreResult<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);

        let collection = match self.collections.get(ns) {
            Some(c) => c.clone(),
            None => return Err(Self::not_found(ns)),
        };
        let removed = collection.write().remove(id.as_str());

        match removed {
            Some(_) => {
                debug!("Deleted document {} from {}", id, ns);
                Ok(())
            }
            None => Err(Self::not_found(ns)),
        }
    }

    fn stats(&self) -> StoreStats {
        StoreStats {
            inserts: self.inserts.load(Ordering::Relaxed),
            finds: self.finds.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
        }
    }
}

/// Apply every operator in `patch` to a copy of `doc`
fn apply_update(doc: &Document, patch: &UpdateDocument) -> StoreResult<Document> {
    if patch.is_empty() {
        return Err(StoreError::invalid_update("update document is empty"));
    }

    let mut updated = doc.clone();
    for (operator, fields) in patch.as_document() {
        let fields = match fields {
            Value::Object(fields) => fields,
            _ => {
                return Err(StoreError::invalid_update(format!(
                    "operand of {} must be an object",
                    operator
                )))
            }
        };

        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(StoreError::invalid_update("_id is immutable"));
            }
            match operator.as_str() {
                "$set" => *slot_mut(&mut updated, path)? = value.clone(),
                "$unset" => unset_path(&mut updated, path),
                "$inc" => increment(slot_mut(&mut updated, path)?, value, path)?,
                "$push" => push(slot_mut(&mut updated, path)?, value, path)?,
                other if other.starts_with('$') => {
                    return Err(StoreError::invalid_update(format!("unsupported operator {}", other)))
                }
                other => {
                    return Err(StoreError::invalid_update(format!(
                        "field {} is not an update operator",
                        other
                    )))
                }
            }
        }
    }

    Ok(updated)
}

/// Slot for a dotted path, creating intermediate sub-documents as needed
fn slot_mut<'a>(doc: &'a mut Document, path: &str) -> StoreResult<&'a mut Value> {
    let mut parts = path.split('.').peekable();
    let mut current = doc;
    loop {
        let part = parts
            .next()
            .ok_or_else(|| StoreError::invalid_update("empty field path"))?;
        let slot = current.entry(part).or_insert(Value::Null);
        if parts.peek().is_none() {
            return Ok(slot);
        }
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => {
                return Err(StoreError::invalid_update(format!(
                    "cannot traverse non-object field in {}",
                    path
                )))
            }
        };
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.rsplit_once('.') {
        None => {
            doc.remove(path);
        }
        Some((parent, leaf)) => {
            let mut current = Some(doc);
            for part in parent.split('.') {
                current = current.and_then(|d| d.get_mut(part)).and_then(Value::as_object_mut);
            }
            if let Some(parent) = current {
                parent.remove(leaf);
            }
        }
    }
}

fn increment(slot: &mut Value, by: &Value, path: &str) -> StoreResult<()> {
    let next = match (&*slot, by) {
        (Value::Null, Value::Number(n)) => Value::Number(n.clone()),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Value::from(a.saturating_add(b)),
            _ => {
                let sum = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
                Number::from_f64(sum)
                    .map(Value::Number)
                    .ok_or_else(|| StoreError::invalid_update(format!("non-finite result for {}", path)))?
            }
        },
        _ => {
            return Err(StoreError::invalid_update(format!(
                "$inc requires numeric values for {}",
                path
            )))
        }
    };
    *slot = next;
    Ok(())
}

fn push(slot: &mut Value, value: &Value, path: &str) -> StoreResult<()> {
    match slot {
        Value::Null => {
            *slot = Value::Array(vec![value.clone()]);
            Ok(())
        }
        Value::Array(items) => {
            items.push(value.clone());
            Ok(())
        }
        _ => Err(StoreError::invalid_update(format!("$push target {} is not an array", path))),
    }
}
