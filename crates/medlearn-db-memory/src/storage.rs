use async_trait::async_trait;
use medlearn_storage::{DocumentStore, Page, Query, StorageError, StoredDocument};
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

pub type StorageKey = String; // Format: "collection/id"

pub(crate) fn make_storage_key(collection: &str, id: &str) -> StorageKey {
    format!("{collection}/{id}")
}

/// In-memory document store using papaya lock-free HashMap.
///
/// Reads never block. Writes are serialized by `write_lock`, which also
/// carries the last creation timestamp handed out so insertion order is
/// strictly increasing even when the clock does not advance between inserts.
#[derive(Debug)]
pub struct InMemoryStore {
    data: PapayaHashMap<StorageKey, StoredDocument>,
    write_lock: Mutex<OffsetDateTime>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
            write_lock: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        }
    }

    /// Number of documents across all collections.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, collection: &str, query: &Query) -> Vec<StoredDocument> {
        let guard = self.data.pin();
        let mut docs: Vec<StoredDocument> = guard
            .iter()
            .filter(|(_, doc)| doc.collection == collection && query.matches(&doc.body))
            .map(|(_, doc)| doc.clone())
            .collect();
        docs.sort_by(|a, b| query.compare(a, b));
        docs
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<StoredDocument, StorageError> {
        let mut last_created = self.write_lock.lock().await;
        let key = make_storage_key(collection, id);
        let guard = self.data.pin();
        if guard.get(&key).is_some() {
            return Err(StorageError::already_exists(collection, id));
        }

        let mut doc = StoredDocument::new(collection, id, body);
        if doc.created_at <= *last_created {
            doc.created_at = *last_created + Duration::microseconds(1);
            doc.updated_at = doc.created_at;
        }
        *last_created = doc.created_at;

        guard.insert(key, doc.clone());
        tracing::trace!(collection, id, "inserted document");
        Ok(doc)
    }

    async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<StoredDocument>, StorageError> {
        let key = make_storage_key(collection, id);
        Ok(self.data.pin().get(&key).cloned())
    }

    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<StoredDocument, StorageError> {
        let _write = self.write_lock.lock().await;
        let key = make_storage_key(collection, id);
        let guard = self.data.pin();
        let current = guard
            .get(&key)
            .ok_or_else(|| StorageError::not_found(collection, id))?;

        if let Some(expected) = expected_version
            && expected != current.version
        {
            return Err(StorageError::version_conflict(expected, current.version));
        }

        let next = current.next_version(body);
        guard.insert(key, next.clone());
        Ok(next)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError> {
        let _write = self.write_lock.lock().await;
        let key = make_storage_key(collection, id);
        match self.data.pin().remove(&key) {
            Some(_) => Ok(()),
            None => Err(StorageError::not_found(collection, id)),
        }
    }

    async fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Page<StoredDocument>, StorageError> {
        let docs = self.matching(collection, query);
        let total = docs.len() as u64;
        let items = docs
            .into_iter()
            .skip(query.offset)
            .take(query.effective_limit())
            .collect();
        Ok(Page { items, total })
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, StorageError> {
        let guard = self.data.pin();
        let n = guard
            .iter()
            .filter(|(_, doc)| doc.collection == collection && query.matches(&doc.body))
            .count();
        Ok(n as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
