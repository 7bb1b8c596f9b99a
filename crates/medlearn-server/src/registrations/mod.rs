//! Event registrations.
//!
//! Status moves:
//!
//! * `pending` to `confirmed`, `rejected` or `cancelled`
//! * `waitlisted` to `pending`, `confirmed` or `cancelled`
//! * `confirmed` to `attended` or `cancelled`
//!
//! A registration holds a seat while pending, confirmed or attended. Freed
//! seats go to the oldest waitlisted registration of the same event (or EMR
//! session).

pub mod handlers;
pub mod service;
pub mod types;

pub use service::{registrations, SYSTEM_ACTOR};
pub use types::{InvalidTransition, Registration, RegistrationStatus, StatusChange};
