use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::{ObjectStoreError, Result};

/// Longest key accepted by [`validate_key`], in bytes.
pub const MAX_KEY_LEN: usize = 512;

/// Metadata kept for every stored object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub content_type: String,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
    #[serde(with = "time::serde::rfc3339")]
    pub stored_at: OffsetDateTime,
}

impl ObjectMeta {
    pub(crate) fn describe(key: &str, bytes: &[u8], content_type: &str) -> Self {
        Self {
            key: key.to_string(),
            size: bytes.len() as u64,
            content_type: content_type.to_string(),
            sha256: sha256_hex(bytes),
            stored_at: OffsetDateTime::now_utc(),
        }
    }
}

/// An object with its content.
#[derive(Debug, Clone)]
pub struct Object {
    pub meta: ObjectMeta,
    pub bytes: Vec<u8>,
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checks that a key is a relative, `/`-separated path without traversal.
///
/// # Errors
///
/// Returns `ObjectStoreError::InvalidKey` describing the first problem found.
pub fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason| ObjectStoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("too long"));
    }
    if key.starts_with('/') {
        return Err(invalid("must be relative"));
    }
    if key.contains('\\') || key.chars().any(char::is_control) {
        return Err(invalid("forbidden character"));
    }
    for segment in key.split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            _ => {}
        }
    }
    Ok(())
}

/// Reduces an uploaded file name to a safe single key segment.
///
/// Keeps ASCII letters, digits, `.`, `_` and `-`; everything else becomes
/// `_`. Leading dots are dropped so the result is never hidden or relative.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send a full path
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let capped: String = trimmed.chars().take(100).collect();
    if capped.is_empty() || capped.chars().all(|c| c == '_') {
        "file".to_string()
    } else {
        capped
    }
}
