//! Mapping of lower-layer errors onto [`ApiError`].
//!
//! Used as `.map_err(storage_error)?` in handlers.

use medlearn_api::{ApiError, FieldError};
use medlearn_cv::{CvError, CvIssue};
use medlearn_objects::ObjectStoreError;
use medlearn_storage::{ErrorCategory, StorageError};

pub fn storage_error(err: StorageError) -> ApiError {
    let category = err.category();
    match category {
        ErrorCategory::NotFound | ErrorCategory::Conflict => {
            tracing::debug!(%category, error = %err, "document store rejected operation");
        }
        ErrorCategory::Validation | ErrorCategory::Infrastructure | ErrorCategory::Internal => {
            tracing::error!(%category, error = %err, "document store failure");
        }
    }
    match err {
        StorageError::NotFound { collection, .. } => {
            ApiError::not_found(format!("{} not found", singular(&collection)))
        }
        StorageError::VersionConflict { .. } => {
            ApiError::conflict("The resource was modified concurrently, please retry")
        }
        StorageError::AlreadyExists { collection, .. } => {
            ApiError::conflict(format!("{} already exists", singular(&collection)))
        }
        StorageError::ConnectionError { .. } => ApiError::service_unavailable("Storage is unavailable"),
        other => ApiError::internal(other.to_string()),
    }
}

pub fn object_error(err: ObjectStoreError) -> ApiError {
    match err {
        ObjectStoreError::NotFound { .. } => ApiError::not_found("Stored file not found"),
        ObjectStoreError::InvalidKey { key, reason } => {
            ApiError::internal(format!("invalid object key {key}: {reason}"))
        }
        other => ApiError::internal(other.to_string()),
    }
}

pub fn cv_error(err: CvError) -> ApiError {
    ApiError::internal(err.to_string())
}

pub fn cv_issues(issues: Vec<CvIssue>) -> ApiError {
    ApiError::validation(
        issues
            .into_iter()
            .map(|i| FieldError::new(i.field, i.message))
            .collect(),
    )
}

fn singular(collection: &str) -> String {
    let name = collection.strip_suffix('s').unwrap_or(collection);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Resource".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn storage_errors_map_to_statuses() {
        let cases = [
            (StorageError::not_found("events", "e1"), StatusCode::NOT_FOUND),
            (StorageError::version_conflict(1, 2), StatusCode::CONFLICT),
            (StorageError::already_exists("users", "a@b.org"), StatusCode::CONFLICT),
            (StorageError::connection_error("down"), StatusCode::SERVICE_UNAVAILABLE),
            (StorageError::invalid_document("users/u1: missing field"), StatusCode::INTERNAL_SERVER_ERROR),
            (StorageError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(storage_error(err).status_code(), status);
        }
    }

    #[test]
    fn not_found_names_the_kind() {
        let err = storage_error(StorageError::not_found("registrations", "r1"));
        assert_eq!(err.to_string(), "Not found: Registration not found");
    }

    #[test]
    fn cv_issues_become_field_errors() {
        let err = cv_issues(vec![CvIssue {
            field: "personal.full_name".into(),
            message: "must not be empty".into(),
        }]);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.to_body();
        assert_eq!(body.error.details[0].field, "personal.full_name");
    }
}
