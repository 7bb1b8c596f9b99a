//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Token settings.
///
/// # Example (TOML)
///
/// ```toml
/// [auth]
/// jwt_secret = "change-me-to-at-least-32-random-bytes"
/// issuer = "https://learn.example.org"
/// token_ttl_secs = 86400
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret.
    pub jwt_secret: String,

    /// Value of the `iss` claim; tokens from other issuers are rejected.
    pub issuer: String,

    /// Access token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            // Development default; validate() refuses it when empty or short
            jwt_secret: "medlearn-development-secret-change-me!!".to_string(),
            issuer: "medlearn".to_string(),
            token_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(format!(
                "auth.jwt_secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }
        if self.issuer.trim().is_empty() {
            return Err("auth.issuer must not be empty".into());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs must be > 0".into());
        }
        Ok(())
    }
}
