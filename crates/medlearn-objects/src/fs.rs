use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::error::{ObjectStoreError, Result};
use crate::types::{Object, ObjectMeta, validate_key};
use crate::ObjectStore;

/// Object store on the local filesystem.
///
/// Layout under `root`:
/// - `data/<key>`: object content
/// - `meta/<key>.json`: [`ObjectMeta`]
///
/// Files are written to a temporary sibling and renamed into place, so a
/// reader never observes a partially written object.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates the store, making sure the root directory exists.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("data")).await?;
        fs::create_dir_all(root.join("meta")).await?;
        tracing::info!(root = %root.display(), "filesystem object store ready");
        Ok(Self { root })
    }

    fn data_path(&self, key: &str) -> PathBuf {
        self.root.join("data").join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join("meta").join(format!("{key}.json"))
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;
    let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4()));
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn map_missing(err: std::io::Error, key: &str) -> ObjectStoreError {
    if err.kind() == ErrorKind::NotFound {
        ObjectStoreError::not_found(key)
    } else {
        ObjectStoreError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<ObjectMeta> {
        validate_key(key)?;
        let meta = ObjectMeta::describe(key, &bytes, content_type);
        let meta_json = serde_json::to_vec(&meta).map_err(|e| ObjectStoreError::CorruptMetadata {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        write_atomic(&self.data_path(key), &bytes).await?;
        write_atomic(&self.meta_path(key), &meta_json).await?;
        tracing::debug!(key, size = meta.size, "stored object");
        Ok(meta)
    }

    async fn get(&self, key: &str) -> Result<Object> {
        validate_key(key)?;
        let raw_meta = fs::read(self.meta_path(key))
            .await
            .map_err(|e| map_missing(e, key))?;
        let meta: ObjectMeta =
            serde_json::from_slice(&raw_meta).map_err(|e| ObjectStoreError::CorruptMetadata {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        let bytes = fs::read(self.data_path(key))
            .await
            .map_err(|e| map_missing(e, key))?;
        Ok(Object { meta, bytes })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        fs::remove_file(self.data_path(key))
            .await
            .map_err(|e| map_missing(e, key))?;
        match fs::remove_file(self.meta_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(fs::try_exists(self.data_path(key)).await?)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
