//! File attachments: metadata in the document store, bytes in the object store.

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use medlearn_api::{ApiError, ApiResult};
use medlearn_objects::sanitize_filename;
use medlearn_storage::{Collection, Document, Query as StoreQuery};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{object_error, storage_error};
use crate::pagination::{ListResponse, Paging};
use crate::registrations::service::attachment_in_use;
use crate::server::AppState;
use crate::users::CurrentUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Cv,
    Registration,
    #[default]
    Other,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Cv => "cv",
            Purpose::Registration => "registration",
            Purpose::Other => "other",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cv" => Some(Purpose::Cv),
            "registration" => Some(Purpose::Registration),
            "other" | "" => Some(Purpose::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub sha256: String,
    pub object_key: String,
    pub purpose: Purpose,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Document for Attachment {
    const COLLECTION: &'static str = "attachments";

    fn id(&self) -> &str {
        &self.id
    }
}

pub fn attachments(state: &AppState) -> Collection<Attachment> {
    Collection::new(state.store.clone())
}

/// Loads an attachment the caller may see. Foreign attachments are reported
/// as missing.
async fn load_visible(state: &AppState, current: &CurrentUser, id: &str) -> ApiResult<Attachment> {
    match attachments(state).get(id).await.map_err(storage_error)? {
        Some(found) if current.can_access(&found.value.owner_id) => Ok(found.value),
        _ => Err(ApiError::not_found("Attachment not found")),
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("Upload exceeds the size limit")
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}

struct Upload {
    filename: String,
    content_type: String,
    bytes: Vec<u8>,
}

pub async fn upload(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let limits = &state.config.objects;
    let mut upload: Option<Upload> = None;
    let mut purpose = Purpose::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !limits.is_allowed(&content_type) {
                    return Err(ApiError::unsupported_media_type(format!(
                        "Content type {content_type} is not allowed"
                    )));
                }
                let filename = field.file_name().unwrap_or("upload").to_string();

                let mut bytes = Vec::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    if bytes.len() + chunk.len() > limits.max_upload_bytes {
                        return Err(ApiError::payload_too_large(format!(
                            "File exceeds {} bytes",
                            limits.max_upload_bytes
                        )));
                    }
                    bytes.extend_from_slice(&chunk);
                }
                upload = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            Some("purpose") => {
                let text = field.text().await.map_err(multipart_error)?;
                purpose = Purpose::parse(&text).ok_or_else(|| {
                    ApiError::invalid_field("purpose", "must be one of cv, registration, other")
                })?;
            }
            _ => {}
        }
    }

    let Some(upload) = upload else {
        return Err(ApiError::invalid_field("file", "is required"));
    };
    if upload.bytes.is_empty() {
        return Err(ApiError::invalid_field("file", "must not be empty"));
    }

    let id = Uuid::new_v4().to_string();
    let filename = sanitize_filename(&upload.filename);
    let object_key = format!("attachments/{}/{id}/{filename}", current.id());
    let meta = state
        .objects
        .put(&object_key, upload.bytes, &upload.content_type)
        .await
        .map_err(object_error)?;

    let attachment = Attachment {
        id,
        owner_id: current.id().to_string(),
        filename,
        content_type: upload.content_type,
        size: meta.size,
        sha256: meta.sha256,
        object_key,
        purpose,
        created_at: OffsetDateTime::now_utc(),
    };
    if let Err(e) = attachments(&state).insert(&attachment).await {
        // Keep the object store free of unreferenced blobs.
        if let Err(cleanup) = state.objects.delete(&attachment.object_key).await {
            tracing::warn!(key = %attachment.object_key, error = %cleanup, "Failed to remove orphaned object");
        }
        return Err(storage_error(e));
    }

    tracing::info!(
        attachment_id = %attachment.id,
        user_id = %current.id(),
        size = attachment.size,
        purpose = attachment.purpose.as_str(),
        "Attachment uploaded"
    );
    Ok((StatusCode::CREATED, Json(attachment)))
}

#[derive(Debug, Deserialize)]
pub struct AttachmentListParams {
    pub purpose: Option<Purpose>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<AttachmentListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::new(params.limit, params.offset);
    let mut query = StoreQuery::new().eq("owner_id", current.id());
    if let Some(purpose) = params.purpose {
        query = query.eq("purpose", purpose.as_str());
    }
    let page = attachments(&state)
        .find(&paging.apply(query))
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse::new(page, paging, |a| a)))
}

pub async fn get(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(load_visible(&state, &current, &id).await?))
}

pub async fn content(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let attachment = load_visible(&state, &current, &id).await?;
    let object = state
        .objects
        .get(&attachment.object_key)
        .await
        .map_err(object_error)?;

    let content_type = HeaderValue::from_str(&attachment.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", attachment.filename))
            .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = Response::new(Body::from(object.bytes));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

pub async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attachment = load_visible(&state, &current, &id).await?;

    if attachment_in_use(&state, &attachment.owner_id, &attachment.id).await? {
        return Err(ApiError::conflict(
            "Attachment is referenced by an active registration",
        ));
    }

    attachments(&state)
        .delete(&attachment.id)
        .await
        .map_err(storage_error)?;
    match state.objects.delete(&attachment.object_key).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(object_error(e)),
    }

    tracing::info!(attachment_id = %attachment.id, user_id = %current.id(), "Attachment deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_parsing() {
        assert_eq!(Purpose::parse("CV"), Some(Purpose::Cv));
        assert_eq!(Purpose::parse(" registration "), Some(Purpose::Registration));
        assert_eq!(Purpose::parse(""), Some(Purpose::Other));
        assert_eq!(Purpose::parse("avatar"), None);
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_value(Purpose::Registration).unwrap(), "registration");
    }
}
