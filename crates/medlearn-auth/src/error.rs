//! Authentication error types.

use axum::response::{IntoResponse, Response};
use medlearn_api::ApiError;

/// Errors that can occur while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credentials were supplied.
    #[error("Authentication required")]
    MissingCredentials,

    /// The access token is invalid, malformed, or cannot be parsed.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The access token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// A token could not be produced.
    #[error("Token encoding failed: {message}")]
    Encoding {
        /// Underlying encoder error.
        message: String,
    },
}

impl AuthError {
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => ApiError::unauthorized("Authentication required"),
            AuthError::InvalidToken { .. } => ApiError::unauthorized("Invalid access token"),
            AuthError::TokenExpired => ApiError::unauthorized("Token expired"),
            AuthError::Encoding { message } => ApiError::internal(message),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "authentication rejected");
        ApiError::from(self).into_response()
    }
}
