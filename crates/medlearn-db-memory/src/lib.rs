//! In-memory document store for the MedLearn server.
//!
//! Used for development and tests. Nothing survives a restart.
//!
//! # Example
//!
//! ```ignore
//! use medlearn_db_memory::InMemoryStore;
//! use medlearn_storage::DocumentStore;
//!
//! let store = InMemoryStore::new();
//! store.insert("events", "e1", serde_json::json!({"title": "Grand Rounds"})).await?;
//! ```

mod storage;

pub use medlearn_storage::{DocumentStore, StorageError, StoredDocument};
pub use storage::{InMemoryStore, StorageKey};

/// Creates a new in-memory store behind an `Arc`.
pub fn create_store() -> medlearn_storage::DynDocumentStore {
    std::sync::Arc::new(InMemoryStore::new())
}
