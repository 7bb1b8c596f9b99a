use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use medlearn_api::{ApiError, ApiResult, FieldError};
use medlearn_storage::Query as StoreQuery;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::service::{has_free_seat, promote_waitlisted, registrations, seated_status};
use super::types::{Registration, RegistrationStatus, StatusChange};
use crate::attachments::attachments;
use crate::error::storage_error;
use crate::events::{EventKind, EventStatus, load_event};
use crate::pagination::{ListResponse, Paging};
use crate::server::AppState;
use crate::users::{CurrentAdmin, CurrentUser};

pub const MAX_MOTIVATION_CHARS: usize = 2000;
pub const MAX_NOTE_CHARS: usize = 1000;
pub const MAX_ATTACHMENTS: usize = 10;

#[derive(Debug, Deserialize)]
pub struct CreateRegistration {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub motivation: Option<String>,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
}

/// Loads a registration the caller may see; others get 404.
async fn load_visible(state: &AppState, current: &CurrentUser, id: &str) -> ApiResult<(Registration, u64)> {
    match registrations(state).get(id).await.map_err(storage_error)? {
        Some(found) if current.can_access(&found.value.user_id) => Ok((found.value, found.version)),
        _ => Err(ApiError::not_found("Registration not found")),
    }
}

async fn check_attachments(state: &AppState, owner_id: &str, ids: &[String]) -> ApiResult<()> {
    let coll = attachments(state);
    for id in ids {
        let owned = coll
            .get(id)
            .await
            .map_err(storage_error)?
            .is_some_and(|a| a.value.owner_id == owner_id);
        if !owned {
            return Err(ApiError::invalid_field(
                "attachment_ids",
                format!("attachment {id} does not exist or is not yours"),
            ));
        }
    }
    Ok(())
}

pub async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(event_id): Path<String>,
    Json(req): Json<CreateRegistration>,
) -> Result<impl IntoResponse, ApiError> {
    let motivation = req
        .motivation
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    let mut errors = Vec::new();
    if motivation
        .as_ref()
        .is_some_and(|m| m.chars().count() > MAX_MOTIVATION_CHARS)
    {
        errors.push(FieldError::new(
            "motivation",
            format!("must be at most {MAX_MOTIVATION_CHARS} characters"),
        ));
    }
    let mut seen = HashSet::new();
    let attachment_ids: Vec<String> = req
        .attachment_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if attachment_ids.len() > MAX_ATTACHMENTS {
        errors.push(FieldError::new(
            "attachment_ids",
            format!("must have at most {MAX_ATTACHMENTS} entries"),
        ));
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let _guard = state.locks.lock_event(&event_id).await;
    let (event, _) = load_event(&state, &event_id, current.is_admin()).await?;

    if event.status != EventStatus::Open {
        return Err(ApiError::conflict("Event is not open for registration"));
    }
    let now = OffsetDateTime::now_utc();
    if let Some(reason) = event.registration_closed_reason(now) {
        return Err(ApiError::conflict(reason));
    }

    let session_id = req
        .session_id
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    match (event.details.emr(), session_id.as_deref()) {
        (Some(emr), Some(id)) if emr.session(id).is_none() => {
            return Err(ApiError::invalid_field("session_id", "does not match a session of this training"));
        }
        (Some(_), None) => {
            return Err(ApiError::invalid_field("session_id", "is required for EMR trainings"));
        }
        (None, Some(_)) => {
            return Err(ApiError::invalid_field("session_id", "is only allowed for EMR trainings"));
        }
        _ => {}
    }

    let mine = registrations(&state)
        .find(
            &StoreQuery::new()
                .eq("event_id", event.id.as_str())
                .eq("user_id", current.id()),
        )
        .await
        .map_err(storage_error)?;
    if mine.items.iter().any(|r| r.status.is_active()) {
        return Err(ApiError::conflict("You are already registered for this event"));
    }

    check_attachments(&state, current.id(), &attachment_ids).await?;

    let status = if has_free_seat(&state, &event, session_id.as_deref()).await? {
        seated_status(&event)
    } else if event.waitlist_enabled {
        RegistrationStatus::Waitlisted
    } else {
        return Err(ApiError::conflict("Event is full"));
    };

    let registration = Registration {
        id: Uuid::new_v4().to_string(),
        event_id: event.id.clone(),
        event_kind: event.kind,
        user_id: current.id().to_string(),
        session_id,
        status,
        motivation,
        attachment_ids,
        status_history: vec![StatusChange {
            status,
            at: now,
            by: current.id().to_string(),
            note: None,
        }],
        created_at: now,
        updated_at: now,
    };
    let stored = registrations(&state)
        .insert(&registration)
        .await
        .map_err(storage_error)?;

    info!(
        registration_id = %registration.id,
        event_id = %event.id,
        user_id = %current.id(),
        status = %status,
        "Registration created"
    );
    Ok((StatusCode::CREATED, Json(stored.value)))
}

#[derive(Debug, Deserialize)]
pub struct RegistrationListParams {
    pub status: Option<RegistrationStatus>,
    pub kind: Option<EventKind>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_mine(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(params): Query<RegistrationListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::new(params.limit, params.offset);
    let mut query = StoreQuery::new().eq("user_id", current.id());
    if let Some(status) = params.status {
        query = query.eq("status", status.as_str());
    }
    if let Some(kind) = params.kind {
        query = query.eq("event_kind", kind.as_str());
    }
    let page = registrations(&state)
        .find(&paging.apply(query))
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse::new(page, paging, |r| r)))
}

pub async fn get(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (registration, _) = load_visible(&state, &current, &id).await?;
    Ok(Json(registration))
}

pub async fn cancel(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (found, _) = load_visible(&state, &current, &id).await?;

    let _guard = state.locks.lock_event(&found.event_id).await;
    // Re-read under the lock; the status may have moved meanwhile.
    let (mut registration, version) = load_visible(&state, &current, &id).await?;
    let freed_seat = registration.status.holds_seat();

    registration
        .transition(RegistrationStatus::Cancelled, current.id(), None, OffsetDateTime::now_utc())
        .map_err(|e| ApiError::conflict(e.to_string()))?;
    let stored = registrations(&state)
        .replace(&registration, Some(version))
        .await
        .map_err(storage_error)?;

    info!(
        registration_id = %registration.id,
        event_id = %registration.event_id,
        user_id = %registration.user_id,
        by = %current.id(),
        "Registration cancelled"
    );

    if freed_seat {
        let (event, _) = load_event(&state, &registration.event_id, true).await?;
        promote_waitlisted(&state, &event, registration.session_id.as_deref()).await?;
    }
    Ok(Json(stored.value))
}

#[derive(Debug, Deserialize)]
pub struct EventRegistrationParams {
    pub status: Option<RegistrationStatus>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_for_event(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
    Path(event_id): Path<String>,
    Query(params): Query<EventRegistrationParams>,
) -> Result<impl IntoResponse, ApiError> {
    load_event(&state, &event_id, true).await?;

    let paging = Paging::new(params.limit, params.offset);
    let mut query = StoreQuery::new().eq("event_id", event_id.as_str());
    if let Some(status) = params.status {
        query = query.eq("status", status.as_str());
    }
    if let Some(session_id) = params.session_id {
        query = query.eq("session_id", session_id);
    }
    let page = registrations(&state)
        .find(&paging.apply(query))
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse::new(page, paging, |r| r)))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub status: RegistrationStatus,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn set_status(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let note = req.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_CHARS) {
        return Err(ApiError::invalid_field(
            "note",
            format!("must be at most {MAX_NOTE_CHARS} characters"),
        ));
    }

    let (found, _) = load_visible(&state, &admin, &id).await?;
    let _guard = state.locks.lock_event(&found.event_id).await;
    let (mut registration, version) = load_visible(&state, &admin, &id).await?;
    let (event, _) = load_event(&state, &registration.event_id, true).await?;

    let was_seated = registration.status.holds_seat();
    if !registration.status.can_transition_to(req.status) {
        return Err(ApiError::conflict(format!(
            "cannot change registration status from {} to {}",
            registration.status, req.status
        )));
    }
    if !was_seated
        && req.status.holds_seat()
        && !has_free_seat(&state, &event, registration.session_id.as_deref()).await?
    {
        return Err(ApiError::conflict("No free seat for this registration"));
    }

    registration
        .transition(req.status, admin.id(), note, OffsetDateTime::now_utc())
        .map_err(|e| ApiError::conflict(e.to_string()))?;
    let stored = registrations(&state)
        .replace(&registration, Some(version))
        .await
        .map_err(storage_error)?;

    info!(
        registration_id = %registration.id,
        event_id = %registration.event_id,
        user_id = %registration.user_id,
        admin_id = %admin.id(),
        status = %registration.status,
        "Registration status changed"
    );

    if was_seated && !registration.status.holds_seat() {
        promote_waitlisted(&state, &event, registration.session_id.as_deref()).await?;
    }
    Ok(Json(stored.value))
}
