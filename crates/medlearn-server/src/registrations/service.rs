//! Capacity bookkeeping shared by the event and registration routes.
//!
//! Every function here expects the caller to hold the event's lock from
//! [`KeyedLocks::lock_event`](crate::locks::KeyedLocks::lock_event).

use medlearn_api::ApiResult;
use medlearn_storage::{Collection, MAX_PAGE_SIZE, Query};
use time::OffsetDateTime;
use tracing::info;

use super::types::{Registration, RegistrationStatus};
use crate::error::storage_error;
use crate::events::{Event, EventStatus};
use crate::server::AppState;

/// Actor recorded for automatic status changes.
pub const SYSTEM_ACTOR: &str = "system";

pub fn registrations(state: &AppState) -> Collection<Registration> {
    Collection::new(state.store.clone())
}

fn scoped(event_id: &str, session_id: Option<&str>) -> Query {
    let query = Query::new().eq("event_id", event_id);
    match session_id {
        Some(session) => query.eq("session_id", session),
        None => query,
    }
}

/// Registrations occupying a seat in the event, or in one session of it.
pub async fn seats_taken(state: &AppState, event_id: &str, session_id: Option<&str>) -> ApiResult<u64> {
    let coll = registrations(state);
    let mut taken = 0;
    for status in RegistrationStatus::SEATED {
        taken += coll
            .count(&scoped(event_id, session_id).eq("status", status.as_str()))
            .await
            .map_err(storage_error)?;
    }
    Ok(taken)
}

pub async fn has_free_seat(state: &AppState, event: &Event, session_id: Option<&str>) -> ApiResult<bool> {
    match event.seat_limit(session_id) {
        None => Ok(true),
        Some(limit) => Ok(seats_taken(state, &event.id, session_id).await? < u64::from(limit)),
    }
}

/// Status a newly seated registration receives.
pub fn seated_status(event: &Event) -> RegistrationStatus {
    if event.auto_confirm {
        RegistrationStatus::Confirmed
    } else {
        RegistrationStatus::Pending
    }
}

/// Moves the oldest waitlisted registrations of a scope into free seats.
/// Returns the promoted registrations.
pub async fn promote_waitlisted(
    state: &AppState,
    event: &Event,
    session_id: Option<&str>,
) -> ApiResult<Vec<Registration>> {
    let mut promoted = Vec::new();
    if event.status == EventStatus::Cancelled {
        return Ok(promoted);
    }

    let coll = registrations(state);
    while has_free_seat(state, event, session_id).await? {
        let next = coll
            .find_one(
                // Default order is insertion order, i.e. oldest first.
                scoped(&event.id, session_id).eq("status", RegistrationStatus::Waitlisted.as_str()),
            )
            .await
            .map_err(storage_error)?;
        let Some(mut registration) = next else {
            break;
        };

        let note = Some("Promoted from the waitlist".to_string());
        if registration
            .transition(seated_status(event), SYSTEM_ACTOR, note, OffsetDateTime::now_utc())
            .is_err()
        {
            break;
        }
        let stored = coll.replace(&registration, None).await.map_err(storage_error)?;
        info!(
            registration_id = %registration.id,
            event_id = %event.id,
            user_id = %registration.user_id,
            status = %registration.status,
            "Registration promoted from waitlist"
        );
        promoted.push(stored.value);
    }
    Ok(promoted)
}

/// Runs [`promote_waitlisted`] for every seat scope of the event.
pub async fn promote_all(state: &AppState, event: &Event) -> ApiResult<usize> {
    let mut count = 0;
    for scope in event.seat_scopes() {
        count += promote_waitlisted(state, event, scope.as_deref()).await?.len();
    }
    Ok(count)
}

/// Cancels every active registration of a cancelled event.
pub async fn cancel_all(state: &AppState, event: &Event, by: &str) -> ApiResult<usize> {
    let coll = registrations(state);
    let mut cancelled = 0;
    for status in RegistrationStatus::ACTIVE {
        // Cancelled entries drop out of the filter, so re-query until empty.
        loop {
            let page = coll
                .find(&Query::new().eq("event_id", event.id.as_str()).eq("status", status.as_str()))
                .await
                .map_err(storage_error)?;
            if page.items.is_empty() {
                break;
            }
            for mut registration in page.items {
                let note = Some("Event cancelled".to_string());
                if registration
                    .transition(RegistrationStatus::Cancelled, by, note, OffsetDateTime::now_utc())
                    .is_ok()
                {
                    coll.replace(&registration, None).await.map_err(storage_error)?;
                    cancelled += 1;
                }
            }
        }
    }
    info!(event_id = %event.id, cancelled, "Registrations cancelled with event");
    Ok(cancelled)
}

/// True when any registration, in any status, points at the event.
pub async fn has_registrations(state: &AppState, event_id: &str) -> ApiResult<bool> {
    let total = registrations(state)
        .count(&Query::new().eq("event_id", event_id))
        .await
        .map_err(storage_error)?;
    Ok(total > 0)
}

/// Active registrations of the event booked into `session_id`.
pub async fn active_in_session(state: &AppState, event_id: &str, session_id: &str) -> ApiResult<u64> {
    let coll = registrations(state);
    let mut total = 0;
    for status in RegistrationStatus::ACTIVE {
        total += coll
            .count(&scoped(event_id, Some(session_id)).eq("status", status.as_str()))
            .await
            .map_err(storage_error)?;
    }
    Ok(total)
}

/// True when an active registration of `user_id` lists the attachment.
pub async fn attachment_in_use(state: &AppState, user_id: &str, attachment_id: &str) -> ApiResult<bool> {
    let coll = registrations(state);
    for status in RegistrationStatus::ACTIVE {
        let mut offset = 0;
        loop {
            let query = Query::new()
                .eq("user_id", user_id)
                .eq("status", status.as_str())
                .limit(MAX_PAGE_SIZE)
                .offset(offset);
            let page = coll.find(&query).await.map_err(storage_error)?;
            if page
                .items
                .iter()
                .any(|r| r.attachment_ids.iter().any(|a| a == attachment_id))
            {
                return Ok(true);
            }
            offset += page.items.len();
            if page.items.is_empty() || offset as u64 >= page.total {
                break;
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::events::{EventDetails, EventKind, WorkshopDetails};

    fn event(capacity: Option<u32>, auto_confirm: bool) -> Event {
        let now = OffsetDateTime::now_utc();
        Event {
            id: "e1".into(),
            kind: EventKind::Workshop,
            title: "Suturing".into(),
            description: None,
            location: None,
            starts_at: now + time::Duration::days(10),
            ends_at: now + time::Duration::days(11),
            registration_deadline: None,
            capacity,
            waitlist_enabled: true,
            auto_confirm,
            fee_cents: None,
            currency: None,
            status: EventStatus::Open,
            listed: true,
            details: EventDetails::Workshop(WorkshopDetails::default()),
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn add(state: &AppState, id: &str, status: RegistrationStatus) {
        let now = OffsetDateTime::now_utc();
        let registration = Registration {
            id: id.into(),
            event_id: "e1".into(),
            event_kind: EventKind::Workshop,
            user_id: format!("user-{id}"),
            session_id: None,
            status,
            motivation: None,
            attachment_ids: vec![],
            status_history: vec![],
            created_at: now,
            updated_at: now,
        };
        registrations(state).insert(&registration).await.unwrap();
    }

    async fn status_of(state: &AppState, id: &str) -> RegistrationStatus {
        registrations(state).require(id).await.unwrap().value.status
    }

    #[tokio::test]
    async fn counts_only_seated_registrations() {
        let state = AppState::in_memory(AppConfig::default());
        add(&state, "a", RegistrationStatus::Pending).await;
        add(&state, "b", RegistrationStatus::Confirmed).await;
        add(&state, "c", RegistrationStatus::Waitlisted).await;
        add(&state, "d", RegistrationStatus::Cancelled).await;
        assert_eq!(seats_taken(&state, "e1", None).await.unwrap(), 2);
        assert!(!has_free_seat(&state, &event(Some(2), false), None).await.unwrap());
        assert!(has_free_seat(&state, &event(None, false), None).await.unwrap());
    }

    #[tokio::test]
    async fn promotes_oldest_waitlisted_first() {
        let state = AppState::in_memory(AppConfig::default());
        add(&state, "seated", RegistrationStatus::Confirmed).await;
        add(&state, "first", RegistrationStatus::Waitlisted).await;
        add(&state, "second", RegistrationStatus::Waitlisted).await;

        let promoted = promote_waitlisted(&state, &event(Some(2), true), None).await.unwrap();
        assert_eq!(promoted.len(), 1);
        assert_eq!(promoted[0].id, "first");
        assert_eq!(status_of(&state, "first").await, RegistrationStatus::Confirmed);
        assert_eq!(status_of(&state, "second").await, RegistrationStatus::Waitlisted);
    }

    #[tokio::test]
    async fn promotion_respects_manual_confirmation() {
        let state = AppState::in_memory(AppConfig::default());
        add(&state, "w", RegistrationStatus::Waitlisted).await;
        promote_all(&state, &event(Some(1), false)).await.unwrap();
        assert_eq!(status_of(&state, "w").await, RegistrationStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_all_touches_only_active() {
        let state = AppState::in_memory(AppConfig::default());
        add(&state, "p", RegistrationStatus::Pending).await;
        add(&state, "w", RegistrationStatus::Waitlisted).await;
        add(&state, "r", RegistrationStatus::Rejected).await;

        let mut cancelled_event = event(Some(5), false);
        cancelled_event.set_status(EventStatus::Cancelled);
        assert_eq!(cancel_all(&state, &cancelled_event, "admin").await.unwrap(), 2);
        assert_eq!(status_of(&state, "p").await, RegistrationStatus::Cancelled);
        assert_eq!(status_of(&state, "w").await, RegistrationStatus::Cancelled);
        assert_eq!(status_of(&state, "r").await, RegistrationStatus::Rejected);
        assert!(promote_all(&state, &cancelled_event).await.unwrap() == 0);
    }

    #[tokio::test]
    async fn attachment_references_found_past_first_page() {
        let state = AppState::in_memory(AppConfig::default());
        let now = OffsetDateTime::now_utc();
        let coll = registrations(&state);
        for i in 0..MAX_PAGE_SIZE + 20 {
            let attachment_ids = if i == MAX_PAGE_SIZE + 10 { vec!["att-late".to_string()] } else { vec![] };
            let registration = Registration {
                id: format!("r{i}"),
                event_id: format!("e{i}"),
                event_kind: EventKind::Workshop,
                user_id: "u1".into(),
                session_id: None,
                status: RegistrationStatus::Pending,
                motivation: None,
                attachment_ids,
                status_history: vec![],
                created_at: now,
                updated_at: now,
            };
            coll.insert(&registration).await.unwrap();
        }

        assert!(attachment_in_use(&state, "u1", "att-late").await.unwrap());
        assert!(!attachment_in_use(&state, "u1", "att-other").await.unwrap());
        assert!(!attachment_in_use(&state, "u2", "att-late").await.unwrap());
    }
}
