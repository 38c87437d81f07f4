//! Entity store contract
//!
//! The engine only talks to persistence through [`EntityStore`]. Records are
//! schemaless JSON documents keyed by `(kind, id)`; the typed helpers at the
//! bottom of this module convert them to and from [`Entity`] structs.
//!
//! Every method mutates at most one document and is atomic for that
//! document. Nothing spans documents: multi-document consistency is the job
//! of the callers, which serialize through [`crate::locks::EntityLocks`].

mod journal;
mod memory;

pub use journal::{Journal, StoreEvent};
pub use memory::{MemoryEntityStore, StoreStats};

use crate::entity::{fields, Entity};
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use anyhow::Result;
use serde_json::Value;

/// A stored record
pub type Document = serde_json::Map<String, Value>;

/// Scan filter for [`EntityStore::find`]
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every record of the collection
    All,
    /// `field == value`
    Eq(String, Value),
    /// The array `field` contains `value`
    Contains(String, Value),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(field.to_string(), value.into())
    }

    pub fn contains(field: &str, value: impl Into<Value>) -> Self {
        Filter::Contains(field.to_string(), value.into())
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => document.get(field) == Some(value),
            Filter::Contains(field, value) => match document.get(field) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
        }
    }
}

/// Top-level field assignments applied by [`EntityStore::update_by_id`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch(Document);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn set_if(self, field: &str, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.set(field, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Apply to a document. The record id is immutable and silently kept.
    pub fn apply_to(&self, document: &mut Document) {
        for (field, value) in &self.0 {
            if field != fields::ID {
                document.insert(field.clone(), value.clone());
            }
        }
    }
}

/// Persistence contract consumed by the engine.
///
/// Set helpers return `Ok(None)` when the record does not exist and
/// `Ok(Some(changed))` otherwise, so callers can tell a real edge change
/// from a no-op.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Point lookup
    async fn find_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<Option<Document>>;

    /// Scan a collection, in insertion order
    async fn find(&self, kind: EntityKind, filter: &Filter) -> EngineResult<Vec<Document>>;

    /// Insert a new record; the document must carry its `_id`
    async fn insert(&self, kind: EntityKind, document: Document) -> EngineResult<Document>;

    /// Partial update, returning the updated record
    async fn update_by_id(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Patch,
    ) -> EngineResult<Option<Document>>;

    /// Delete a record; `false` when it was already absent
    async fn delete_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<bool>;

    /// Set-union `value` into the array `field`
    async fn add_to_set(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>>;

    /// Remove every occurrence of `value` from the array `field`
    async fn pull(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>>;

    /// Add `delta` to an integer field, returning the new value
    async fn increment_field(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        delta: i64,
    ) -> EngineResult<Option<i64>>;

    /// Number of records in a collection
    async fn count(&self, kind: EntityKind) -> EngineResult<usize> {
        Ok(self.find(kind, &Filter::All).await?.len())
    }

    /// Flush buffered writes to durable storage
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// Implement EntityStore for Arc<S> to allow sharing a concrete store
#[async_trait::async_trait]
impl<S: EntityStore + ?Sized> EntityStore for std::sync::Arc<S> {
    async fn find_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<Option<Document>> {
        (**self).find_by_id(kind, id).await
    }

    async fn find(&self, kind: EntityKind, filter: &Filter) -> EngineResult<Vec<Document>> {
        (**self).find(kind, filter).await
    }

    async fn insert(&self, kind: EntityKind, document: Document) -> EngineResult<Document> {
        (**self).insert(kind, document).await
    }

    async fn update_by_id(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Patch,
    ) -> EngineResult<Option<Document>> {
        (**self).update_by_id(kind, id, patch).await
    }

    async fn delete_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<bool> {
        (**self).delete_by_id(kind, id).await
    }

    async fn add_to_set(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        (**self).add_to_set(kind, id, field, value).await
    }

    async fn pull(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        (**self).pull(kind, id, field, value).await
    }

    async fn increment_field(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        delta: i64,
    ) -> EngineResult<Option<i64>> {
        (**self).increment_field(kind, id, field, delta).await
    }

    async fn count(&self, kind: EntityKind) -> EngineResult<usize> {
        (**self).count(kind).await
    }

    async fn flush(&self) -> Result<()> {
        (**self).flush().await
    }
}

// ==================== TYPED HELPERS ====================

/// Id as a JSON value, for set helpers and filters
pub fn id_value(id: &EntityId) -> Value {
    Value::String(id.to_string())
}

/// Turn the `None` of a single-document helper into `NotFound`
pub fn found<T>(value: Option<T>, kind: EntityKind, id: &EntityId) -> EngineResult<T> {
    value.ok_or_else(|| EngineError::not_found(kind, id))
}

/// Load a record, `NotFound` when absent
pub async fn load<E: Entity>(store: &dyn EntityStore, id: &EntityId) -> EngineResult<E> {
    try_load(store, id).await?.ok_or_else(|| EngineError::not_found(E::KIND, id))
}

/// Load a record if it exists
pub async fn try_load<E: Entity>(store: &dyn EntityStore, id: &EntityId) -> EngineResult<Option<E>> {
    match store.find_by_id(E::KIND, id).await? {
        Some(document) => Ok(Some(E::from_document(document)?)),
        None => Ok(None),
    }
}

/// Scan and decode a collection
pub async fn load_where<E: Entity>(store: &dyn EntityStore, filter: &Filter) -> EngineResult<Vec<E>> {
    store.find(E::KIND, filter).await?.into_iter().map(E::from_document).collect()
}

/// Insert a typed record
pub async fn save_new<E: Entity>(store: &dyn EntityStore, entity: &E) -> EngineResult<E> {
    let stored = store.insert(E::KIND, entity.to_document()?).await?;
    E::from_document(stored)
}

/// Patch a record, `NotFound` when absent
pub async fn patch<E: Entity>(store: &dyn EntityStore, id: &EntityId, patch: &Patch) -> EngineResult<E> {
    match store.update_by_id(E::KIND, id, patch).await? {
        Some(document) => E::from_document(document),
        None => Err(EngineError::not_found(E::KIND, id)),
    }
}
