//! Seeds the initial administrator account on startup.
//!
//! Idempotent: an existing account with the configured email is left as is.

use medlearn_api::ApiResult;
use medlearn_auth::Role;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::error::storage_error;
use crate::server::AppState;
use crate::users::{User, find_by_email, hash_blocking, normalize_email, users};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// No admin configured.
    Skipped,
    AlreadyPresent,
    Created,
}

pub async fn bootstrap_admin(state: &AppState, cfg: &BootstrapConfig) -> ApiResult<BootstrapOutcome> {
    let (Some(email), Some(password)) = (&cfg.admin_email, &cfg.admin_password) else {
        return Ok(BootstrapOutcome::Skipped);
    };
    let email = normalize_email(email);

    let _guard = state.locks.lock_email(&email).await;
    if let Some(existing) = find_by_email(state, &email).await? {
        if existing.role != Role::Admin {
            warn!(user_id = %existing.id, "Bootstrap admin email belongs to a non-admin account");
        }
        info!(user_id = %existing.id, "Admin account already present, skipping bootstrap");
        return Ok(BootstrapOutcome::AlreadyPresent);
    }

    let now = OffsetDateTime::now_utc();
    let admin = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: hash_blocking(password.clone()).await?,
        full_name: cfg.admin_name.trim().to_string(),
        phone: None,
        profession: None,
        institution: None,
        role: Role::Admin,
        active: true,
        created_at: now,
        updated_at: now,
        last_login_at: None,
    };
    users(state).insert(&admin).await.map_err(storage_error)?;

    info!(user_id = %admin.id, "Bootstrap admin account created");
    Ok(BootstrapOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn admin_config() -> BootstrapConfig {
        BootstrapConfig {
            admin_email: Some("Chief@Hospital.org".into()),
            admin_password: Some("correct-horse-battery".into()),
            admin_name: "Chief Resident".into(),
        }
    }

    #[tokio::test]
    async fn skipped_without_credentials() {
        let state = AppState::in_memory(AppConfig::default());
        let outcome = bootstrap_admin(&state, &BootstrapConfig::default()).await.unwrap();
        assert_eq!(outcome, BootstrapOutcome::Skipped);
    }

    #[tokio::test]
    async fn creates_admin_once() {
        let state = AppState::in_memory(AppConfig::default());
        let cfg = admin_config();

        assert_eq!(bootstrap_admin(&state, &cfg).await.unwrap(), BootstrapOutcome::Created);
        assert_eq!(
            bootstrap_admin(&state, &cfg).await.unwrap(),
            BootstrapOutcome::AlreadyPresent
        );

        let admin = find_by_email(&state, "chief@hospital.org").await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.full_name, "Chief Resident");
        assert!(admin.password_hash.starts_with("$argon2"));
    }
}
