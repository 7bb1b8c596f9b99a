/// Errors returned by object store backends.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("Object store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt object metadata for {key}: {message}")]
    CorruptMetadata { key: String, message: String },
}

impl ObjectStoreError {
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;
