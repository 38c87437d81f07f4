//! In-memory entity store on SCC hash maps, optionally journaled to disk

use super::{Document, EntityStore, Filter, Journal, Patch, StoreEvent};
use crate::config::StorageConfig;
use crate::entity::fields;
use crate::error::{EngineError, EngineResult};
use crate::id::{EntityId, EntityKind};
use anyhow::Result;
use chrono::Utc;
use scc::hash_map::Entry;
use scc::HashMap as SccHashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Versioned record: `version` is bumped on every committed write
#[derive(Debug, Clone)]
pub struct VersionedEntry {
    pub version: u64,
    /// Insertion sequence, gives scans a stable natural order
    pub seq: u64,
    pub last_updated: i64,
    pub data: Document,
}

#[derive(Debug, Default)]
pub struct StoreStats {
    pub reads: AtomicU64,
    pub writes: AtomicU64,
}

/// Entity store keeping every collection in a lock-free map.
///
/// With a [`Journal`] attached each write is appended to disk before it
/// becomes visible, and [`MemoryEntityStore::open`] rebuilds the maps from
/// it.
pub struct MemoryEntityStore {
    collections: [SccHashMap<String, VersionedEntry>; EntityKind::COUNT],
    journal: Option<Journal>,
    next_seq: AtomicU64,
    stats: StoreStats,
}

impl Default for MemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntityStore {
    /// Volatile store, nothing survives the process
    pub fn new() -> Self {
        Self {
            collections: std::array::from_fn(|_| SccHashMap::new()),
            journal: None,
            next_seq: AtomicU64::new(0),
            stats: StoreStats::default(),
        }
    }

    /// Store configured from [`StorageConfig`]: journaled when enabled
    pub fn open(config: &StorageConfig) -> Result<Self> {
        if !config.journal_enabled {
            return Ok(Self::new());
        }

        let start = std::time::Instant::now();
        let (journal, events) = Journal::open(&config.data_dir, config.fsync_on_append)?;
        let mut store = Self::new();
        let count = events.len();
        for event in events {
            store.replay(event);
        }
        store.journal = Some(journal);
        log::info!("Replayed {} store event(s) in {:?}", count, start.elapsed());
        Ok(store)
    }

    fn replay(&self, event: StoreEvent) {
        match event {
            StoreEvent::Put { kind, id, document } => {
                match self.collection(kind).entry_sync(id.to_string()) {
                    Entry::Occupied(mut o) => {
                        let entry = o.get_mut();
                        entry.data = document;
                        entry.version += 1;
                    }
                    Entry::Vacant(v) => {
                        v.insert_entry(self.new_entry(document));
                    }
                }
            }
            StoreEvent::Remove { kind, id } => {
                if let Entry::Occupied(o) = self.collection(kind).entry_sync(id.to_string()) {
                    let _ = o.remove();
                }
            }
        }
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Current version of a record, `None` when absent
    pub fn version_of(&self, kind: EntityKind, id: &EntityId) -> Option<u64> {
        self.collection(kind).read_sync(id.as_str(), |_, entry| entry.version)
    }

    fn collection(&self, kind: EntityKind) -> &SccHashMap<String, VersionedEntry> {
        &self.collections[kind as usize]
    }

    fn new_entry(&self, data: Document) -> VersionedEntry {
        VersionedEntry {
            version: 1,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            last_updated: Utc::now().timestamp(),
            data,
        }
    }

    fn record(&self, event: StoreEvent) -> EngineResult<()> {
        self.stats.writes.fetch_add(1, Ordering::Relaxed);
        match &self.journal {
            Some(journal) => journal.append(&event),
            None => Ok(()),
        }
    }

    /// Read-modify-write of one record under its map entry lock.
    ///
    /// `f` works on a copy; the copy is journaled and swapped in only when
    /// it differs from the stored record.
    fn mutate<R>(
        &self,
        kind: EntityKind,
        id: &EntityId,
        f: impl FnOnce(&mut Document) -> EngineResult<R>,
    ) -> EngineResult<Option<(R, Document)>> {
        match self.collection(kind).entry_sync(id.to_string()) {
            Entry::Occupied(mut o) => {
                let entry = o.get_mut();
                let mut next = entry.data.clone();
                let result = f(&mut next)?;
                if next != entry.data {
                    if next.contains_key(fields::UPDATED_AT) {
                        next.insert(fields::UPDATED_AT.into(), serde_json::to_value(Utc::now())?);
                    }
                    self.record(StoreEvent::Put {
                        kind,
                        id: id.clone(),
                        document: next.clone(),
                    })?;
                    entry.data = next;
                    entry.version += 1;
                    entry.last_updated = Utc::now().timestamp();
                }
                Ok(Some((result, entry.data.clone())))
            }
            Entry::Vacant(_) => Ok(None),
        }
    }
}

fn array_field<'a>(
    document: &'a mut Document,
    field: &str,
) -> EngineResult<&'a mut Vec<Value>> {
    let slot = document.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => Ok(items),
        _ => Err(EngineError::ValidationFailed(format!("Field '{}' is not an array", field))),
    }
}

fn document_id(document: &Document) -> EngineResult<EntityId> {
    match document.get(fields::ID) {
        Some(Value::String(raw)) => EntityId::parse(raw),
        _ => Err(EngineError::ValidationFailed("Document has no string _id".into())),
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<Option<Document>> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.collection(kind).read_sync(id.as_str(), |_, entry| entry.data.clone()))
    }

    async fn find(&self, kind: EntityKind, filter: &Filter) -> EngineResult<Vec<Document>> {
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        let mut matched = Vec::new();
        self.collection(kind).retain_sync(|_, entry| {
            if filter.matches(&entry.data) {
                matched.push((entry.seq, entry.data.clone()));
            }
            true // Keep all records
        });
        matched.sort_by_key(|(seq, _)| *seq);
        Ok(matched.into_iter().map(|(_, data)| data).collect())
    }

    async fn insert(&self, kind: EntityKind, document: Document) -> EngineResult<Document> {
        let id = document_id(&document)?;
        match self.collection(kind).entry_sync(id.to_string()) {
            Entry::Occupied(_) => Err(EngineError::Conflict(format!("{} {} already exists", kind, id))),
            Entry::Vacant(v) => {
                self.record(StoreEvent::Put { kind, id, document: document.clone() })?;
                v.insert_entry(self.new_entry(document.clone()));
                Ok(document)
            }
        }
    }

    async fn update_by_id(
        &self,
        kind: EntityKind,
        id: &EntityId,
        patch: &Patch,
    ) -> EngineResult<Option<Document>> {
        let updated = self.mutate(kind, id, |doc| {
            patch.apply_to(doc);
            Ok(())
        })?;
        Ok(updated.map(|(_, doc)| doc))
    }

    async fn delete_by_id(&self, kind: EntityKind, id: &EntityId) -> EngineResult<bool> {
        match self.collection(kind).entry_sync(id.to_string()) {
            Entry::Occupied(o) => {
                self.record(StoreEvent::Remove { kind, id: id.clone() })?;
                let _ = o.remove();
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn add_to_set(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        let outcome = self.mutate(kind, id, |doc| {
            let items = array_field(doc, field)?;
            if items.contains(&value) {
                return Ok(false);
            }
            items.push(value);
            Ok(true)
        })?;
        Ok(outcome.map(|(changed, _)| changed))
    }

    async fn pull(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        value: Value,
    ) -> EngineResult<Option<bool>> {
        let outcome = self.mutate(kind, id, |doc| {
            let items = array_field(doc, field)?;
            let before = items.len();
            items.retain(|item| item != &value);
            Ok(items.len() != before)
        })?;
        Ok(outcome.map(|(changed, _)| changed))
    }

    async fn increment_field(
        &self,
        kind: EntityKind,
        id: &EntityId,
        field: &str,
        delta: i64,
    ) -> EngineResult<Option<i64>> {
        let outcome = self.mutate(kind, id, |doc| {
            let current = match doc.get(field) {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    EngineError::ValidationFailed(format!("Field '{}' is not an integer", field))
                })?,
            };
            let next = current + delta;
            doc.insert(field.to_string(), Value::from(next));
            Ok(next)
        })?;
        Ok(outcome.map(|(value, _)| value))
    }

    async fn count(&self, kind: EntityKind) -> EngineResult<usize> {
        Ok(self.collection(kind).len())
    }

    async fn flush(&self) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_with_id(id: &EntityId, extra: Value) -> Document {
        let mut doc = match extra {
            Value::Object(map) => map,
            _ => Document::new(),
        };
        doc.insert("_id".into(), json!(id.to_string()));
        doc
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Fan, doc_with_id(&id, json!({ "name": "Ada" }))).await.unwrap();

        let found = store.find_by_id(EntityKind::Fan, &id).await.unwrap().unwrap();
        assert_eq!(found["name"], "Ada");
        assert!(store.find_by_id(EntityKind::Creator, &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Fan, doc_with_id(&id, json!({}))).await.unwrap();
        let err = store.insert(EntityKind::Fan, doc_with_id(&id, json!({}))).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_find_preserves_insertion_order() {
        let store = MemoryEntityStore::new();
        let ids: Vec<EntityId> = (0..20).map(|_| EntityId::generate()).collect();
        for (n, id) in ids.iter().enumerate() {
            store.insert(EntityKind::Option, doc_with_id(id, json!({ "n": n }))).await.unwrap();
        }

        let found = store.find(EntityKind::Option, &Filter::All).await.unwrap();
        let order: Vec<u64> = found.iter().map(|d| d["n"].as_u64().unwrap()).collect();
        assert_eq!(order, (0..20).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_set_helpers_report_changes() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Creator, doc_with_id(&id, json!({ "fans": [] }))).await.unwrap();

        assert_eq!(store.add_to_set(EntityKind::Creator, &id, "fans", json!("f1")).await.unwrap(), Some(true));
        assert_eq!(store.add_to_set(EntityKind::Creator, &id, "fans", json!("f1")).await.unwrap(), Some(false));
        assert_eq!(store.pull(EntityKind::Creator, &id, "fans", json!("f1")).await.unwrap(), Some(true));
        assert_eq!(store.pull(EntityKind::Creator, &id, "fans", json!("f1")).await.unwrap(), Some(false));

        let missing = EntityId::generate();
        assert_eq!(store.add_to_set(EntityKind::Creator, &missing, "fans", json!("f1")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_only_moves_on_change() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Fan, doc_with_id(&id, json!({ "votes": [] }))).await.unwrap();
        assert_eq!(store.version_of(EntityKind::Fan, &id), Some(1));

        store.add_to_set(EntityKind::Fan, &id, "votes", json!("o1")).await.unwrap();
        store.add_to_set(EntityKind::Fan, &id, "votes", json!("o1")).await.unwrap();
        assert_eq!(store.version_of(EntityKind::Fan, &id), Some(2));
    }

    #[tokio::test]
    async fn test_increment_field() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Option, doc_with_id(&id, json!({ "title": "x" }))).await.unwrap();

        assert_eq!(store.increment_field(EntityKind::Option, &id, "counter", 1).await.unwrap(), Some(1));
        assert_eq!(store.increment_field(EntityKind::Option, &id, "counter", 2).await.unwrap(), Some(3));
        let err = store.increment_field(EntityKind::Option, &id, "title", 1).await.unwrap_err();
        assert!(matches!(err, EngineError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryEntityStore::new();
        let id = EntityId::generate();
        store.insert(EntityKind::Project, doc_with_id(&id, json!({}))).await.unwrap();
        assert!(store.delete_by_id(EntityKind::Project, &id).await.unwrap());
        assert!(!store.delete_by_id(EntityKind::Project, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_journal_rebuilds_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            journal_enabled: true,
            fsync_on_append: false,
        };
        let kept = EntityId::generate();
        let dropped = EntityId::generate();

        {
            let store = MemoryEntityStore::open(&config).unwrap();
            store.insert(EntityKind::Fan, doc_with_id(&kept, json!({ "votes": [] }))).await.unwrap();
            store.insert(EntityKind::Fan, doc_with_id(&dropped, json!({}))).await.unwrap();
            store.add_to_set(EntityKind::Fan, &kept, "votes", json!("o1")).await.unwrap();
            store.delete_by_id(EntityKind::Fan, &dropped).await.unwrap();
            store.flush().await.unwrap();
        }

        let store = MemoryEntityStore::open(&config).unwrap();
        let fan = store.find_by_id(EntityKind::Fan, &kept).await.unwrap().unwrap();
        assert_eq!(fan["votes"], json!(["o1"]));
        assert!(store.find_by_id(EntityKind::Fan, &dropped).await.unwrap().is_none());
    }
}
