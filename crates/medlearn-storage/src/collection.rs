//! Typed access to a collection.
//!
//! Handlers work with domain structs, not raw JSON. [`Collection`] does the
//! serde round trip and keeps the collection name next to the type.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StorageError;
use crate::traits::DocumentStore;
use crate::types::{Page, Query, StoredDocument};

/// A domain type persisted as one document.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the type is stored in.
    const COLLECTION: &'static str;

    /// Document id.
    fn id(&self) -> &str;
}

/// A typed document together with its stored version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Typed view over one collection of a [`DocumentStore`].
pub struct Collection<T> {
    store: Arc<dyn DocumentStore>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Document> Collection<T> {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    fn decode(doc: StoredDocument) -> Result<Versioned<T>, StorageError> {
        let value = serde_json::from_value(doc.body).map_err(|e| {
            StorageError::invalid_document(format!("{}/{}: {e}", doc.collection, doc.id))
        })?;
        Ok(Versioned {
            version: doc.version,
            value,
        })
    }

    pub async fn insert(&self, value: &T) -> Result<Versioned<T>, StorageError> {
        let body = serde_json::to_value(value)?;
        let doc = self.store.insert(T::COLLECTION, value.id(), body).await?;
        Self::decode(doc)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Versioned<T>>, StorageError> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Like [`Collection::get`] but a missing document is an error.
    pub async fn require(&self, id: &str) -> Result<Versioned<T>, StorageError> {
        self.get(id)
            .await?
            .ok_or_else(|| StorageError::not_found(T::COLLECTION, id))
    }

    pub async fn replace(
        &self,
        value: &T,
        expected_version: Option<u64>,
    ) -> Result<Versioned<T>, StorageError> {
        let body = serde_json::to_value(value)?;
        let doc = self
            .store
            .replace(T::COLLECTION, value.id(), body, expected_version)
            .await?;
        Self::decode(doc)
    }

    /// Inserts or replaces without a version check.
    pub async fn upsert(&self, value: &T) -> Result<Versioned<T>, StorageError> {
        match self.store.get(T::COLLECTION, value.id()).await? {
            Some(_) => self.replace(value, None).await,
            None => self.insert(value).await,
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(T::COLLECTION, id).await
    }

    pub async fn find(&self, query: &Query) -> Result<Page<T>, StorageError> {
        self.store
            .find(T::COLLECTION, query)
            .await?
            .try_map(|doc| Self::decode(doc).map(|v| v.value))
    }

    /// First match of a query, if any.
    pub async fn find_one(&self, query: Query) -> Result<Option<T>, StorageError> {
        let page = self.find(&query.limit(1)).await?;
        Ok(page.items.into_iter().next())
    }

    pub async fn count(&self, query: &Query) -> Result<u64, StorageError> {
        self.store.count(T::COLLECTION, query).await
    }
}
