//! Authentication for the MedLearn server.
//!
//! - [`password`]: Argon2id hashing and the password length policy
//! - [`jwt`]: HS256 access tokens
//! - [`extractors`]: `AuthUser` and `OptionalAuthUser` for axum handlers

pub mod config;
pub mod error;
pub mod extractors;
pub mod jwt;
pub mod password;
pub mod types;

pub use config::AuthConfig;
pub use error::AuthError;
pub use extractors::{AuthState, AuthUser, OptionalAuthUser};
pub use jwt::{Claims, IssuedToken, JwtService};
pub use types::Role;
