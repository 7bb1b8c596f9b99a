//! Axum extractors for bearer authentication.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::error::AuthError;
use crate::jwt::{Claims, JwtService};
use crate::types::Role;

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer token authentication.
///
/// Include it in the application state and expose it via `FromRef`:
///
/// ```ignore
/// impl FromRef<AppState> for AuthState {
///     fn from_ref(state: &AppState) -> Self {
///         state.auth.clone()
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct AuthState {
    pub jwt: Arc<JwtService>,
}

impl AuthState {
    #[must_use]
    pub fn new(jwt: Arc<JwtService>) -> Self {
        Self { jwt }
    }
}

// =============================================================================
// Extractors
// =============================================================================

/// An authenticated caller, taken from a valid `Authorization: Bearer` token.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::invalid_token("Authorization header is not valid ASCII"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::invalid_token("Invalid Authorization header format"))
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = auth_state.jwt.validate(token)?;
        Ok(AuthUser::from(claims))
    }
}

/// Like [`AuthUser`] but anonymous requests yield `None` instead of 401.
/// A present but invalid token is still rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl<S> FromRequestParts<S> for OptionalAuthUser
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(OptionalAuthUser(None));
        }
        AuthUser::from_request_parts(parts, state)
            .await
            .map(|u| OptionalAuthUser(Some(u)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    fn app(state: AuthState) -> Router {
        Router::new()
            .route("/me", get(|user: AuthUser| async move { user.id }))
            .route(
                "/maybe",
                get(|OptionalAuthUser(user): OptionalAuthUser| async move {
                    user.map(|u| u.id).unwrap_or_else(|| "anonymous".into())
                }),
            )
            .with_state(state)
    }

    fn state() -> AuthState {
        AuthState::new(Arc::new(JwtService::new(&AuthConfig::default())))
    }

    async fn call(state: AuthState, path: &str, token: Option<&str>) -> (StatusCode, String) {
        let mut req = Request::builder().uri(path);
        if let Some(t) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {t}"));
        }
        let resp = app(state)
            .oneshot(req.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let (status, _) = call(state(), "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_yields_user() {
        let st = state();
        let token = st.jwt.issue("u-42", "a@b.org", Role::User).unwrap();
        let (status, body) = call(st, "/me", Some(&token.access_token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "u-42");
    }

    #[tokio::test]
    async fn optional_user_allows_anonymous_but_not_garbage() {
        let (status, body) = call(state(), "/maybe", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, _) = call(state(), "/maybe", Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
