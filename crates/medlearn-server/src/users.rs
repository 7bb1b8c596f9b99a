//! Accounts: registration, login, profile and admin management.

use std::sync::LazyLock;

use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
};
use medlearn_api::{ApiError, ApiResult, FieldError};
use medlearn_auth::password::{check_password_policy, hash_password, verify_password};
use medlearn_auth::{AuthUser, IssuedToken, OptionalAuthUser, Role};
use medlearn_storage::{Collection, Document, Query as StoreQuery};
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::storage_error;
use crate::pagination::{ListResponse, Paging};
use crate::server::AppState;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_EMAIL_LEN: usize = 254;

const INVALID_LOGIN: &str = "Invalid email or password";

/// `local@domain.tld`, no whitespace, exactly one `@`.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex"));

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Stored lowercased.
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    pub role: Role,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A user as returned by the API, without the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    pub role: Role,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            full_name: u.full_name,
            phone: u.phone,
            profession: u.profession,
            institution: u.institution,
            role: u.role,
            active: u.active,
            created_at: u.created_at,
            updated_at: u.updated_at,
            last_login_at: u.last_login_at,
        }
    }
}

pub fn users(state: &AppState) -> Collection<User> {
    Collection::new(state.store.clone())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn find_by_email(state: &AppState, email: &str) -> ApiResult<Option<User>> {
    users(state)
        .find_one(StoreQuery::new().eq("email", normalize_email(email)))
        .await
        .map_err(storage_error)
}

fn check_email(errors: &mut Vec<FieldError>, email: &str) {
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        errors.push(FieldError::new("email", "must be a valid email address"));
    }
}

fn check_name(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    let len = value.trim().chars().count();
    if len == 0 {
        errors.push(FieldError::new(field, "must not be empty"));
    } else if len > MAX_NAME_LEN {
        errors.push(FieldError::new(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

/// Trims an optional profile field; blank means unset.
fn check_optional(errors: &mut Vec<FieldError>, field: &str, value: Option<String>) -> Option<String> {
    let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    if let Some(v) = &value
        && v.chars().count() > MAX_NAME_LEN
    {
        errors.push(FieldError::new(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    value
}

pub(crate) async fn hash_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| ApiError::internal(format!("password hashing failed: {e}")))
}

async fn verify_blocking(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(|e| ApiError::internal(format!("stored password hash is invalid: {e}")))
}

// =============================================================================
// Extractors
// =============================================================================

/// The authenticated caller's account, loaded from the store.
///
/// Rejects deleted accounts with 401 and deactivated ones with 403, so a
/// still-valid token stops working once an admin deactivates the account.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub version: u64,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }

    /// True when the caller owns `owner_id` or is an admin.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.user.id == owner_id
    }
}

async fn load_active(state: &AppState, id: &str) -> ApiResult<CurrentUser> {
    let Some(found) = users(state).get(id).await.map_err(storage_error)? else {
        return Err(ApiError::unauthorized("Account no longer exists"));
    };
    if !found.value.active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }
    Ok(CurrentUser {
        user: found.value,
        version: found.version,
    })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;
        load_active(state, &auth.id).await
    }
}

/// Like [`CurrentUser`] but requires the admin role on the stored account,
/// so role changes apply to tokens already issued.
#[derive(Debug, Clone)]
pub struct CurrentAdmin(pub CurrentUser);

impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if !current.is_admin() {
            return Err(ApiError::forbidden("Administrator role required"));
        }
        Ok(CurrentAdmin(current))
    }
}

/// The caller's account when a bearer token is sent, `None` for anonymous
/// requests. Public listings use it to decide what an admin may also see.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn is_admin(&self) -> bool {
        self.0.as_ref().is_some_and(CurrentUser::is_admin)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let OptionalAuthUser(auth) = OptionalAuthUser::from_request_parts(parts, state).await?;
        match auth {
            Some(auth) => Ok(MaybeUser(Some(load_active(state, &auth.id).await?))),
            None => Ok(MaybeUser(None)),
        }
    }
}

// =============================================================================
// Auth endpoints
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub token: IssuedToken,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let mut errors = Vec::new();
    check_email(&mut errors, &email);
    if let Err(msg) = check_password_policy(&req.password) {
        errors.push(FieldError::new("password", msg));
    }
    check_name(&mut errors, "full_name", &req.full_name);
    let phone = check_optional(&mut errors, "phone", req.phone);
    let profession = check_optional(&mut errors, "profession", req.profession);
    let institution = check_optional(&mut errors, "institution", req.institution);
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let _guard = state.locks.lock_email(&email).await;
    if find_by_email(&state, &email).await?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let now = OffsetDateTime::now_utc();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: hash_blocking(req.password).await?,
        full_name: req.full_name.trim().to_string(),
        phone,
        profession,
        institution,
        role: Role::User,
        active: true,
        created_at: now,
        updated_at: now,
        last_login_at: None,
    };
    let stored = users(&state).insert(&user).await.map_err(storage_error)?;
    let token = state.auth.jwt.issue(&user.id, &user.email, user.role)?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: stored.value.into(),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = find_by_email(&state, &req.email).await? else {
        return Err(ApiError::unauthorized(INVALID_LOGIN));
    };
    if !verify_blocking(req.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "Login failed");
        return Err(ApiError::unauthorized(INVALID_LOGIN));
    }
    if !user.active {
        return Err(ApiError::forbidden("Account is deactivated"));
    }

    let updated = record_login(&state, &user).await?;
    let token = state.auth.jwt.issue(&updated.id, &updated.email, updated.role)?;

    tracing::info!(user_id = %updated.id, "User logged in");
    Ok(Json(AuthResponse {
        user: updated.into(),
        token,
    }))
}

const LOGIN_WRITE_ATTEMPTS: usize = 5;

/// Stamps `last_login_at` on the stored account with a version-checked write.
/// The account is re-read on every attempt; a password or status change made
/// while `verified` was being checked takes precedence.
async fn record_login(state: &AppState, verified: &User) -> ApiResult<User> {
    let coll = users(state);
    for _ in 0..LOGIN_WRITE_ATTEMPTS {
        let Some(found) = coll.get(&verified.id).await.map_err(storage_error)? else {
            return Err(ApiError::unauthorized(INVALID_LOGIN));
        };
        let mut user = found.value;
        if user.password_hash != verified.password_hash {
            return Err(ApiError::unauthorized(INVALID_LOGIN));
        }
        if !user.active {
            return Err(ApiError::forbidden("Account is deactivated"));
        }
        user.last_login_at = Some(OffsetDateTime::now_utc());
        match coll.replace(&user, Some(found.version)).await {
            Ok(stored) => return Ok(stored.value),
            Err(e) if e.is_version_conflict() => continue,
            Err(e) => return Err(storage_error(e)),
        }
    }
    Err(ApiError::conflict("The account was modified concurrently, please retry"))
}

pub async fn me(current: CurrentUser) -> Json<UserView> {
    Json(current.user.into())
}

// =============================================================================
// Profile
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
}

pub async fn update_me(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();
    let mut user = current.user;

    if let Some(name) = req.full_name {
        check_name(&mut errors, "full_name", &name);
        user.full_name = name.trim().to_string();
    }
    // A present field replaces the stored value; an empty string clears it.
    if req.phone.is_some() {
        user.phone = check_optional(&mut errors, "phone", req.phone);
    }
    if req.profession.is_some() {
        user.profession = check_optional(&mut errors, "profession", req.profession);
    }
    if req.institution.is_some() {
        user.institution = check_optional(&mut errors, "institution", req.institution);
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    user.updated_at = OffsetDateTime::now_utc();
    let stored = users(&state)
        .replace(&user, Some(current.version))
        .await
        .map_err(storage_error)?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(UserView::from(stored.value)))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut user = current.user;
    if !verify_blocking(req.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::invalid_field("current_password", "is incorrect"));
    }
    check_password_policy(&req.new_password)
        .map_err(|msg| ApiError::invalid_field("new_password", msg))?;

    user.password_hash = hash_blocking(req.new_password).await?;
    user.updated_at = OffsetDateTime::now_utc();
    users(&state)
        .replace(&user, Some(current.version))
        .await
        .map_err(storage_error)?;

    tracing::info!(user_id = %user.id, "Password changed");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub email: Option<String>,
    pub role: Option<Role>,
    pub active: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_users(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Query(params): Query<UserListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::new(params.limit, params.offset);
    let mut query = StoreQuery::new();
    if let Some(email) = params.email {
        query = query.eq("email", normalize_email(&email));
    }
    if let Some(role) = params.role {
        query = query.eq("role", role.as_str());
    }
    if let Some(active) = params.active {
        query = query.eq("active", active);
    }
    let page = users(&state)
        .find(&paging.apply(query))
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse::new(page, paging, UserView::from)))
}

#[derive(Debug, Deserialize)]
pub struct AdminUpdateUser {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub active: Option<bool>,
}

pub async fn admin_update_user(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<String>,
    Json(req): Json<AdminUpdateUser>,
) -> Result<impl IntoResponse, ApiError> {
    let coll = users(&state);
    let Some(found) = coll.get(&id).await.map_err(storage_error)? else {
        return Err(ApiError::not_found("User not found"));
    };
    let mut user = found.value;

    if user.id == admin.id() && (req.role == Some(Role::User) || req.active == Some(false)) {
        return Err(ApiError::conflict(
            "Administrators cannot demote or deactivate themselves",
        ));
    }
    if let Some(role) = req.role {
        user.role = role;
    }
    if let Some(active) = req.active {
        user.active = active;
    }
    user.updated_at = OffsetDateTime::now_utc();

    let stored = coll
        .replace(&user, Some(found.version))
        .await
        .map_err(storage_error)?;

    tracing::info!(
        user_id = %user.id,
        admin_id = %admin.id(),
        role = %user.role,
        active = user.active,
        "User updated by admin"
    );
    Ok(Json(UserView::from(stored.value)))
}
