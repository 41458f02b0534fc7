use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ripple_core::DomainError;
use ripple_tasks::{LaunchError, TaskStoreError};
use ripple_users::UserStoreError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn unauthorized() -> axum::response::Response {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
}

pub fn not_found(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DomainError::NotFound => not_found("not found"),
        DomainError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DomainError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "forbidden"),
    }
}

pub fn user_store_error_to_response(err: UserStoreError) -> axum::response::Response {
    match err {
        UserStoreError::NotFound(_) => not_found("user not found"),
        UserStoreError::DuplicateUsername(name) => json_error(
            StatusCode::CONFLICT,
            "duplicate_username",
            format!("username already taken: {name}"),
        ),
        UserStoreError::DuplicateEmail(email) => json_error(
            StatusCode::CONFLICT,
            "duplicate_email",
            format!("email already registered: {email}"),
        ),
        UserStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn task_store_error_to_response(err: TaskStoreError) -> axum::response::Response {
    match err {
        TaskStoreError::NotFound(_) => not_found("task not found"),
        TaskStoreError::AlreadyExists(id) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            format!("task already exists: {id}"),
        ),
        TaskStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn launch_error_to_response(err: LaunchError) -> axum::response::Response {
    match err {
        // Broker unreachable at submit time: nothing was staged, the caller
        // can simply retry.
        LaunchError::Enqueue(e) => json_error(StatusCode::BAD_GATEWAY, "enqueue_failed", e.to_string()),
        LaunchError::Store(e) => task_store_error_to_response(e),
    }
}
