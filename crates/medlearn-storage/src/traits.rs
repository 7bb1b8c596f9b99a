//! The document store contract every backend implements.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::types::{Page, Query, StoredDocument};

/// A schemaless JSON document store, partitioned into collections.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use medlearn_storage::{DocumentStore, StorageError, StoredDocument};
///
/// async fn load_event(store: &dyn DocumentStore, id: &str) -> Result<StoredDocument, StorageError> {
///     store
///         .get("events", id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("events", id))
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a new document at version 1.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the id is taken or a unique
    /// index of the backend is violated.
    async fn insert(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<StoredDocument, StorageError>;

    /// Reads a document. Missing documents are `Ok(None)`.
    async fn get(&self, collection: &str, id: &str)
    -> Result<Option<StoredDocument>, StorageError>;

    /// Replaces the body of an existing document and bumps its version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    /// Returns `StorageError::VersionConflict` if `expected_version` is given
    /// and differs from the stored version.
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<StoredDocument, StorageError>;

    /// Removes a document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the document does not exist.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StorageError>;

    /// Runs a query. `Page::total` is the match count before paging.
    async fn find(&self, collection: &str, query: &Query)
    -> Result<Page<StoredDocument>, StorageError>;

    /// Counts matches of a query, ignoring limit and offset.
    async fn count(&self, collection: &str, query: &Query) -> Result<u64, StorageError>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
