use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{ObjectStoreError, Result};
use crate::types::{Object, ObjectMeta, validate_key};
use crate::ObjectStore;

/// Object store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Object>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<ObjectMeta> {
        validate_key(key)?;
        let meta = ObjectMeta::describe(key, &bytes, content_type);
        self.objects.insert(
            key.to_string(),
            Object {
                meta: meta.clone(),
                bytes,
            },
        );
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Object> {
        validate_key(key)?;
        self.objects
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ObjectStoreError::not_found(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::not_found(key))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.objects.contains_key(key))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryObjectStore::new();
        let meta = store
            .put("attachments/u1/a1/scan.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert_eq!(meta.size, 3);
        assert!(store.exists("attachments/u1/a1/scan.png").await.unwrap());

        let obj = store.get("attachments/u1/a1/scan.png").await.unwrap();
        assert_eq!(obj.bytes, vec![1, 2, 3]);
        assert_eq!(obj.meta.content_type, "image/png");

        store.delete("attachments/u1/a1/scan.png").await.unwrap();
        assert!(store.get("attachments/u1/a1/scan.png").await.unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_keys() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            store.put("../x", vec![], "text/plain").await,
            Err(ObjectStoreError::InvalidKey { .. })
        ));
    }
}
