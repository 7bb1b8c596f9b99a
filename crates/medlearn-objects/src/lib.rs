//! Object storage for uploaded files.
//!
//! Attachments are opaque blobs addressed by `/`-separated keys. Two backends
//! are provided: [`MemoryObjectStore`] for tests and development and
//! [`FsObjectStore`] for single-node deployments.

mod error;
mod fs;
mod memory;
mod types;

use async_trait::async_trait;

pub use error::{ObjectStoreError, Result};
pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use types::{MAX_KEY_LEN, Object, ObjectMeta, sanitize_filename, sha256_hex, validate_key};

/// Blob storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores (or overwrites) an object.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<ObjectMeta>;

    /// Loads an object and its metadata.
    async fn get(&self, key: &str) -> Result<Object>;

    /// Removes an object. Missing objects are `NotFound`.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shareable object store.
pub type DynObjectStore = std::sync::Arc<dyn ObjectStore>;
