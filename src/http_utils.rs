//! Shared helpers for the HTTP surface.

use axum::http::StatusCode;

use crate::data_store::DataStoreError;

/// Maps a data store error onto the response for it.
///
/// Missing path ids are 404, reference and consistency errors in the body
/// are 400, uniqueness and dependency clashes are 409, and stock entries
/// answer 403.
pub(crate) fn store_error(err: DataStoreError) -> (StatusCode, String) {
    match err {
        DataStoreError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        DataStoreError::AlreadyExists => (StatusCode::CONFLICT, "already exists".to_string()),
        DataStoreError::Conflict(message) => (StatusCode::CONFLICT, message),
        DataStoreError::Invalid(message) => (StatusCode::BAD_REQUEST, message),
        DataStoreError::ReadOnly => (
            StatusCode::FORBIDDEN,
            "this entry is read-only".to_string(),
        ),
        DataStoreError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
    }
}

/// Current time as epoch seconds. Readings and override expiries share this
/// clock.
pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
