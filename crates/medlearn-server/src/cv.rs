//! CV storage and PDF export routes.

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use medlearn_api::{ApiError, ApiResult};
use medlearn_cv::{Cv, RenderOptions, render_pdf, validate};
use medlearn_objects::sanitize_filename;
use medlearn_storage::{Collection, Document};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{cv_error, cv_issues, storage_error};
use crate::server::AppState;
use crate::users::{CurrentAdmin, CurrentUser, users};

/// One CV per user, keyed by the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvRecord {
    pub id: String,
    pub user_id: String,
    pub cv: Cv,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document for CvRecord {
    const COLLECTION: &'static str = "cvs";

    fn id(&self) -> &str {
        &self.id
    }
}

fn cvs(state: &AppState) -> Collection<CvRecord> {
    Collection::new(state.store.clone())
}

async fn load(state: &AppState, user_id: &str) -> ApiResult<CvRecord> {
    cvs(state)
        .get(user_id)
        .await
        .map_err(storage_error)?
        .map(|v| v.value)
        .ok_or_else(|| ApiError::not_found("No CV has been saved yet"))
}

pub async fn get_cv(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load(&state, current.id()).await?))
}

pub async fn put_cv(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(cv): Json<Cv>,
) -> Result<impl IntoResponse, ApiError> {
    let issues = validate(&cv);
    if !issues.is_empty() {
        return Err(cv_issues(issues));
    }

    let record = CvRecord {
        id: current.id().to_string(),
        user_id: current.id().to_string(),
        cv,
        updated_at: OffsetDateTime::now_utc(),
    };
    let stored = cvs(&state).upsert(&record).await.map_err(storage_error)?;

    tracing::info!(user_id = %current.id(), version = stored.version, "CV saved");
    Ok(Json(stored.value))
}

pub async fn delete_cv(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    cvs(&state)
        .delete(current.id())
        .await
        .map_err(storage_error)?;
    tracing::info!(user_id = %current.id(), "CV deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_cv_pdf(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Response, ApiError> {
    let record = load(&state, current.id()).await?;
    pdf_response(&state, record.cv).await
}

pub async fn user_cv_pdf(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(user_id): Path<String>,
) -> Result<Response, ApiError> {
    if users(&state)
        .get(&user_id)
        .await
        .map_err(storage_error)?
        .is_none()
    {
        return Err(ApiError::not_found("User not found"));
    }
    let record = load(&state, &user_id).await?;
    tracing::info!(user_id = %user_id, admin_id = %admin.id(), "CV exported by admin");
    pdf_response(&state, record.cv).await
}

async fn pdf_response(state: &AppState, cv: Cv) -> Result<Response, ApiError> {
    let filename = format!("{}-cv.pdf", sanitize_filename(cv.personal.full_name.trim()));
    let options = RenderOptions {
        margin: state.config.pdf.margin_pt,
        ..Default::default()
    };

    let bytes = tokio::task::spawn_blocking(move || render_pdf(&cv, &options))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .map_err(cv_error)?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}
