use medlearn_storage::Document;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::events::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Waitlisted,
    Confirmed,
    Rejected,
    Cancelled,
    Attended,
}

impl RegistrationStatus {
    pub const ACTIVE: [RegistrationStatus; 3] = [Self::Pending, Self::Waitlisted, Self::Confirmed];

    /// Statuses counted against capacity.
    pub const SEATED: [RegistrationStatus; 3] = [Self::Pending, Self::Confirmed, Self::Attended];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Waitlisted => "waitlisted",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
        }
    }

    pub fn can_transition_to(self, next: RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Rejected | Cancelled)
                | (Waitlisted, Pending | Confirmed | Cancelled)
                | (Confirmed, Attended | Cancelled)
        )
    }

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn holds_seat(self) -> bool {
        Self::SEATED.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled | Self::Attended)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a registration's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: RegistrationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// User id of the actor, or `system` for automatic promotions.
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub event_kind: EventKind,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub status: RegistrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motivation: Option<String>,
    #[serde(default)]
    pub attachment_ids: Vec<String>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document for Registration {
    const COLLECTION: &'static str = "registrations";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("cannot change registration status from {from} to {to}")]
pub struct InvalidTransition {
    pub from: RegistrationStatus,
    pub to: RegistrationStatus,
}

impl Registration {
    /// Moves to `next` and records the change.
    pub fn transition(
        &mut self,
        next: RegistrationStatus,
        by: &str,
        note: Option<String>,
        at: OffsetDateTime,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = at;
        self.status_history.push(StatusChange {
            status: next,
            at,
            by: by.to_string(),
            note,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RegistrationStatus::*;

    const ALL: [RegistrationStatus; 6] = [Pending, Waitlisted, Confirmed, Rejected, Cancelled, Attended];

    fn registration(status: RegistrationStatus) -> Registration {
        let now = OffsetDateTime::now_utc();
        Registration {
            id: "r1".into(),
            event_id: "e1".into(),
            event_kind: EventKind::Workshop,
            user_id: "u1".into(),
            session_id: None,
            status,
            motivation: None,
            attachment_ids: vec![],
            status_history: vec![StatusChange {
                status,
                at: now,
                by: "u1".into(),
                note: None,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn allowed_transitions() {
        let allowed = [
            (Pending, Confirmed),
            (Pending, Rejected),
            (Pending, Cancelled),
            (Waitlisted, Pending),
            (Waitlisted, Confirmed),
            (Waitlisted, Cancelled),
            (Confirmed, Attended),
            (Confirmed, Cancelled),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        for status in ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|next| !status.can_transition_to(*next)));
            assert!(!status.is_active());
        }
    }

    #[test]
    fn seat_holding() {
        assert!(Pending.holds_seat());
        assert!(Confirmed.holds_seat());
        assert!(Attended.holds_seat());
        assert!(!Waitlisted.holds_seat());
        assert!(!Cancelled.holds_seat());
    }

    #[test]
    fn transition_records_history() {
        let mut reg = registration(Pending);
        let at = OffsetDateTime::now_utc();
        reg.transition(Confirmed, "admin", Some("welcome".into()), at).unwrap();
        assert_eq!(reg.status, Confirmed);
        assert_eq!(reg.status_history.len(), 2);
        assert_eq!(reg.status_history[1].by, "admin");
        assert_eq!(reg.status_history[1].note.as_deref(), Some("welcome"));

        let err = reg.transition(Pending, "admin", None, at).unwrap_err();
        assert_eq!(err, InvalidTransition { from: Confirmed, to: Pending });
        assert_eq!(reg.status_history.len(), 2);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_value(registration(Waitlisted)).unwrap();
        assert_eq!(json["status"], "waitlisted");
        assert_eq!(json["event_kind"], "workshop");
        assert!(json.get("session_id").is_none());
    }
}
