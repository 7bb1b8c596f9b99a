//! Event documents and their validation.

use std::collections::HashSet;

use medlearn_api::FieldError;
use medlearn_storage::Document;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

pub const MAX_TITLE_CHARS: usize = 300;
pub const MAX_TEXT_CHARS: usize = 5000;
pub const MAX_LIST_ENTRIES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Conference,
    Workshop,
    EmrTraining,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conference => "conference",
            Self::Workshop => "workshop",
            Self::EmrTraining => "emr_training",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Draft,
    Open,
    Closed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Allowed lifecycle moves. `Cancelled` is terminal.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Draft, Open) | (Draft, Cancelled) | (Open, Closed) | (Open, Cancelled) | (Closed, Open) | (Closed, Cancelled)
        )
    }

    /// Visible to non-admin callers.
    pub fn is_listed(self) -> bool {
        matches!(self, Self::Open | Self::Closed)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmrLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// One scheduled slot of an EMR training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    /// `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConferenceDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default)]
    pub speakers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cme_credits: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkshopDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator: Option<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_group_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmrTrainingDetails {
    pub emr_system: String,
    pub level: EmrLevel,
    #[serde(default)]
    pub sessions: Vec<Session>,
}

impl EmrTrainingDetails {
    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }
}

/// Kind specific fields, tagged with the event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    Conference(ConferenceDetails),
    Workshop(WorkshopDetails),
    EmrTraining(EmrTrainingDetails),
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Conference(_) => EventKind::Conference,
            Self::Workshop(_) => EventKind::Workshop,
            Self::EmrTraining(_) => EventKind::EmrTraining,
        }
    }

    pub fn emr(&self) -> Option<&EmrTrainingDetails> {
        match self {
            Self::EmrTraining(d) => Some(d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub kind: EventKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registration_deadline: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    pub waitlist_enabled: bool,
    pub auto_confirm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_cents: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub status: EventStatus,
    /// Mirrors `status.is_listed()` so listings can filter with one equality.
    pub listed: bool,
    pub details: EventDetails,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document for Event {
    const COLLECTION: &'static str = "events";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Event {
    pub fn set_status(&mut self, status: EventStatus) {
        self.status = status;
        self.listed = status.is_listed();
    }

    /// Seat limit for a registration: the session's for EMR trainings,
    /// the event's otherwise. `None` means unlimited.
    pub fn seat_limit(&self, session_id: Option<&str>) -> Option<u32> {
        match (self.details.emr(), session_id) {
            (Some(emr), Some(id)) => emr.session(id).and_then(|s| s.capacity),
            _ => self.capacity,
        }
    }

    /// Scopes that have their own seat limit: one per session for EMR
    /// trainings, the whole event otherwise.
    pub fn seat_scopes(&self) -> Vec<Option<String>> {
        match self.details.emr() {
            Some(emr) => emr.sessions.iter().map(|s| Some(s.id.clone())).collect(),
            None => vec![None],
        }
    }

    pub fn registration_closed_reason(&self, now: OffsetDateTime) -> Option<&'static str> {
        if self.registration_deadline.is_some_and(|d| now > d) {
            Some("The registration deadline has passed")
        } else if now >= self.ends_at {
            Some("The event has already ended")
        } else {
            None
        }
    }
}

/// Body of create and update requests.
#[derive(Debug, Clone, Deserialize)]
pub struct EventInput {
    pub kind: EventKind,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registration_deadline: Option<OffsetDateTime>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub waitlist_enabled: bool,
    #[serde(default)]
    pub auto_confirm: bool,
    #[serde(default)]
    pub fee_cents: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Only honoured on create.
    #[serde(default)]
    pub status: Option<EventStatus>,
    pub details: EventDetails,
}

/// UTC with whole seconds, so stored timestamps sort as strings.
fn normalize_time(t: OffsetDateTime) -> OffsetDateTime {
    t.to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .unwrap_or(t)
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn check_len(errors: &mut Vec<FieldError>, field: &str, value: Option<&str>, max: usize) {
    if value.is_some_and(|v| v.chars().count() > max) {
        errors.push(FieldError::new(field, format!("must be at most {max} characters")));
    }
}

fn check_list(errors: &mut Vec<FieldError>, field: &str, items: &[String]) {
    if items.len() > MAX_LIST_ENTRIES {
        errors.push(FieldError::new(field, format!("must have at most {MAX_LIST_ENTRIES} entries")));
    }
    for (i, item) in items.iter().enumerate() {
        if item.trim().is_empty() {
            errors.push(FieldError::new(format!("{field}[{i}]"), "must not be empty"));
        }
    }
}

impl EventInput {
    /// Trims and normalizes the input, collecting every problem found.
    pub fn validate(mut self) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();

        self.title = self.title.trim().to_string();
        let title_len = self.title.chars().count();
        if title_len == 0 {
            errors.push(FieldError::new("title", "must not be empty"));
        } else if title_len > MAX_TITLE_CHARS {
            errors.push(FieldError::new(
                "title",
                format!("must be at most {MAX_TITLE_CHARS} characters"),
            ));
        }
        self.description = clean(self.description);
        self.location = clean(self.location);
        check_len(&mut errors, "description", self.description.as_deref(), MAX_TEXT_CHARS);
        check_len(&mut errors, "location", self.location.as_deref(), MAX_TITLE_CHARS);

        self.starts_at = normalize_time(self.starts_at);
        self.ends_at = normalize_time(self.ends_at);
        self.registration_deadline = self.registration_deadline.map(normalize_time);
        if self.starts_at >= self.ends_at {
            errors.push(FieldError::new("ends_at", "must be after starts_at"));
        }
        if self.registration_deadline.is_some_and(|d| d > self.ends_at) {
            errors.push(FieldError::new("registration_deadline", "must not be after ends_at"));
        }

        if self.capacity == Some(0) {
            errors.push(FieldError::new("capacity", "must be at least 1"));
        }

        self.currency = clean(self.currency).map(|c| c.to_ascii_uppercase());
        if let Some(currency) = &self.currency
            && (currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()))
        {
            errors.push(FieldError::new("currency", "must be a 3 letter ISO 4217 code"));
        }
        if self.fee_cents.is_some_and(|f| f > 0) && self.currency.is_none() {
            errors.push(FieldError::new("currency", "is required when a fee is set"));
        }

        if self.status == Some(EventStatus::Cancelled) {
            errors.push(FieldError::new("status", "an event cannot be created cancelled"));
        }

        if self.details.kind() != self.kind {
            errors.push(FieldError::new(
                "details.kind",
                format!("must match kind \"{}\"", self.kind.as_str()),
            ));
        }
        self.validate_details(&mut errors);

        if errors.is_empty() { Ok(self) } else { Err(errors) }
    }

    fn validate_details(&mut self, errors: &mut Vec<FieldError>) {
        match &mut self.details {
            EventDetails::Conference(d) => {
                d.venue = clean(d.venue.take());
                check_len(errors, "details.venue", d.venue.as_deref(), MAX_TITLE_CHARS);
                check_list(errors, "details.speakers", &d.speakers);
                if d.cme_credits.is_some_and(|c| !c.is_finite() || c < 0.0) {
                    errors.push(FieldError::new("details.cme_credits", "must be a non-negative number"));
                }
            }
            EventDetails::Workshop(d) => {
                d.facilitator = clean(d.facilitator.take());
                check_len(errors, "details.facilitator", d.facilitator.as_deref(), MAX_TITLE_CHARS);
                check_list(errors, "details.prerequisites", &d.prerequisites);
                if d.max_group_size == Some(0) {
                    errors.push(FieldError::new("details.max_group_size", "must be at least 1"));
                }
            }
            EventDetails::EmrTraining(d) => {
                d.emr_system = d.emr_system.trim().to_string();
                if d.emr_system.is_empty() {
                    errors.push(FieldError::new("details.emr_system", "must not be empty"));
                }
                if d.sessions.is_empty() {
                    errors.push(FieldError::new("details.sessions", "must contain at least one session"));
                }
                if d.sessions.len() > MAX_LIST_ENTRIES {
                    errors.push(FieldError::new(
                        "details.sessions",
                        format!("must have at most {MAX_LIST_ENTRIES} entries"),
                    ));
                }
                let mut seen = HashSet::new();
                for (i, session) in d.sessions.iter_mut().enumerate() {
                    let path = format!("details.sessions[{i}]");
                    session.id = session.id.trim().to_string();
                    session.location = clean(session.location.take());
                    session.starts_at = normalize_time(session.starts_at);
                    session.ends_at = normalize_time(session.ends_at);
                    if session.id.is_empty() {
                        errors.push(FieldError::new(format!("{path}.id"), "must not be empty"));
                    } else if !seen.insert(session.id.clone()) {
                        errors.push(FieldError::new(format!("{path}.id"), "must be unique"));
                    }
                    if session.starts_at >= session.ends_at {
                        errors.push(FieldError::new(format!("{path}.ends_at"), "must be after starts_at"));
                    }
                    if session.capacity == Some(0) {
                        errors.push(FieldError::new(format!("{path}.capacity"), "must be at least 1"));
                    }
                }
            }
        }
    }
}
