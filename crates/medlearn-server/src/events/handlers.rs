use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use medlearn_api::{ApiError, ApiResult};
use medlearn_storage::{Collection, Query as StoreQuery, Sort};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::types::{Event, EventInput, EventKind, EventStatus};
use crate::error::storage_error;
use crate::pagination::{ListResponse, Paging};
use crate::registrations::service::{active_in_session, cancel_all, has_registrations, promote_all};
use crate::server::AppState;
use crate::users::{CurrentAdmin, MaybeUser};

pub fn events(state: &AppState) -> Collection<Event> {
    Collection::new(state.store.clone())
}

/// Loads an event with its version. Drafts are reported as missing unless
/// `include_drafts` is set.
pub async fn load_event(state: &AppState, id: &str, include_drafts: bool) -> ApiResult<(Event, u64)> {
    match events(state).get(id).await.map_err(storage_error)? {
        Some(found) if include_drafts || found.value.status != EventStatus::Draft => {
            Ok((found.value, found.version))
        }
        _ => Err(ApiError::not_found("Event not found")),
    }
}

#[derive(Debug, Deserialize)]
pub struct EventListParams {
    pub kind: Option<EventKind>,
    pub status: Option<EventStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list(
    State(state): State<AppState>,
    caller: MaybeUser,
    Query(params): Query<EventListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let paging = Paging::new(params.limit, params.offset);
    let mut query = StoreQuery::new().sort(Sort::asc("starts_at"));
    if !caller.is_admin() {
        query = query.eq("listed", true);
    }
    if let Some(kind) = params.kind {
        query = query.eq("kind", kind.as_str());
    }
    if let Some(status) = params.status {
        query = query.eq("status", status.as_str());
    }
    let page = events(&state)
        .find(&paging.apply(query))
        .await
        .map_err(storage_error)?;
    Ok(Json(ListResponse::new(page, paging, |e| e)))
}

pub async fn get(
    State(state): State<AppState>,
    caller: MaybeUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let (event, _) = load_event(&state, &id, caller.is_admin()).await?;
    Ok(Json(event))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Json(input): Json<EventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.validate().map_err(ApiError::validation)?;

    let now = OffsetDateTime::now_utc();
    let status = input.status.unwrap_or_default();
    let event = Event {
        id: Uuid::new_v4().to_string(),
        kind: input.kind,
        title: input.title,
        description: input.description,
        location: input.location,
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        registration_deadline: input.registration_deadline,
        capacity: input.capacity,
        waitlist_enabled: input.waitlist_enabled,
        auto_confirm: input.auto_confirm,
        fee_cents: input.fee_cents,
        currency: input.currency,
        status,
        listed: status.is_listed(),
        details: input.details,
        created_by: admin.id().to_string(),
        created_at: now,
        updated_at: now,
    };
    let stored = events(&state).insert(&event).await.map_err(storage_error)?;

    info!(
        event_id = %event.id,
        kind = event.kind.as_str(),
        status = %event.status,
        admin_id = %admin.id(),
        "Event created"
    );
    Ok((StatusCode::CREATED, Json(stored.value)))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<String>,
    Json(input): Json<EventInput>,
) -> Result<impl IntoResponse, ApiError> {
    let input = input.validate().map_err(ApiError::validation)?;

    let _guard = state.locks.lock_event(&id).await;
    let (mut event, version) = load_event(&state, &id, true).await?;
    if event.status == EventStatus::Cancelled {
        return Err(ApiError::conflict("A cancelled event cannot be edited"));
    }
    if input.kind != event.kind && has_registrations(&state, &event.id).await? {
        return Err(ApiError::conflict(
            "The kind of an event with registrations cannot change",
        ));
    }
    if let Some(old) = event.details.emr() {
        let kept: HashSet<&str> = input
            .details
            .emr()
            .map(|d| d.sessions.iter().map(|s| s.id.as_str()).collect())
            .unwrap_or_default();
        for session in old.sessions.iter().filter(|s| !kept.contains(s.id.as_str())) {
            if active_in_session(&state, &event.id, &session.id).await? > 0 {
                return Err(ApiError::conflict(format!(
                    "Session {} has active registrations and cannot be removed",
                    session.id
                )));
            }
        }
    }

    event.kind = input.kind;
    event.title = input.title;
    event.description = input.description;
    event.location = input.location;
    event.starts_at = input.starts_at;
    event.ends_at = input.ends_at;
    event.registration_deadline = input.registration_deadline;
    event.capacity = input.capacity;
    event.waitlist_enabled = input.waitlist_enabled;
    event.auto_confirm = input.auto_confirm;
    event.fee_cents = input.fee_cents;
    event.currency = input.currency;
    event.details = input.details;
    event.updated_at = OffsetDateTime::now_utc();

    let stored = events(&state)
        .replace(&event, Some(version))
        .await
        .map_err(storage_error)?;
    info!(event_id = %event.id, admin_id = %admin.id(), "Event updated");

    // Raised capacity may free seats for the waitlist.
    let promoted = promote_all(&state, &event).await?;
    if promoted > 0 {
        info!(event_id = %event.id, promoted, "Waitlist promoted after event update");
    }
    Ok(Json(stored.value))
}

#[derive(Debug, Deserialize)]
pub struct SetEventStatus {
    pub status: EventStatus,
}

pub async fn set_status(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<String>,
    Json(req): Json<SetEventStatus>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.locks.lock_event(&id).await;
    let (mut event, version) = load_event(&state, &id, true).await?;

    let from = event.status;
    if !from.can_transition_to(req.status) {
        return Err(ApiError::conflict(format!(
            "cannot change event status from {from} to {}",
            req.status
        )));
    }
    event.set_status(req.status);
    event.updated_at = OffsetDateTime::now_utc();
    let stored = events(&state)
        .replace(&event, Some(version))
        .await
        .map_err(storage_error)?;

    info!(
        event_id = %event.id,
        admin_id = %admin.id(),
        from = %from,
        to = %event.status,
        "Event status changed"
    );

    if event.status == EventStatus::Cancelled {
        cancel_all(&state, &event, admin.id()).await?;
    }
    Ok(Json(stored.value))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let _guard = state.locks.lock_event(&id).await;
    let (event, _) = load_event(&state, &id, true).await?;

    if event.status != EventStatus::Draft {
        return Err(ApiError::conflict("Only draft events can be deleted"));
    }
    if has_registrations(&state, &event.id).await? {
        return Err(ApiError::conflict("Event has registrations"));
    }
    events(&state).delete(&event.id).await.map_err(storage_error)?;

    info!(event_id = %event.id, admin_id = %admin.id(), "Event deleted");
    Ok(StatusCode::NO_CONTENT)
}
