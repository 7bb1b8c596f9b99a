//! JWT access tokens.
//!
//! Tokens are HS256-signed with a shared secret from [`AuthConfig`]. They are
//! stateless: validation checks signature, issuer and expiry only.
//!
//! ## Example
//!
//! ```ignore
//! use medlearn_auth::{AuthConfig, JwtService, Role};
//!
//! let jwt = JwtService::new(&AuthConfig::default());
//! let issued = jwt.issue(user_id, "ada@example.org", Role::User)?;
//! let claims = jwt.validate(&issued.access_token)?;
//! assert_eq!(claims.sub, user_id);
//! ```

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::types::Role;

/// Claims carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Issuer.
    pub iss: String,
    /// Subject: the user id.
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration time (Unix timestamp).
    pub exp: i64,
    /// JWT ID.
    pub jti: String,
}

/// Token returned to clients after login or registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Signs and validates access tokens.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl_secs: u64,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.issuer)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: config.issuer.clone(),
            ttl_secs: config.token_ttl_secs,
        }
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issues a token for a user, valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Encoding` if signing fails.
    pub fn issue(&self, user_id: &str, email: &str, role: Role) -> Result<IssuedToken, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.ttl_secs as i64,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(IssuedToken {
            access_token: self.encode(&claims)?,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_secs,
        })
    }

    /// Signs arbitrary claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Encoding` if signing fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            AuthError::Encoding {
                message: e.to_string(),
            }
        })
    }

    /// Validates a token and returns its claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenExpired` for expired tokens and
    /// `AuthError::InvalidToken` for any other failure.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::invalid_token(e.to_string()),
            })
    }
}
