//! Conferences, workshops and EMR trainings.
//!
//! Lifecycle: `draft` to `open` or `cancelled`, `open` to `closed` or
//! `cancelled`, `closed` back to `open` or to `cancelled`. Only open events
//! take registrations. Cancelling an event cancels its active registrations.

pub mod handlers;
pub mod types;

pub use handlers::{events, load_event};
pub use types::{
    ConferenceDetails, EmrLevel, EmrTrainingDetails, Event, EventDetails, EventInput, EventKind,
    EventStatus, Session, WorkshopDetails,
};
