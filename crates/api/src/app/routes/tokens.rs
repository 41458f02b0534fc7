use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::CurrentUser;
use crate::middleware::extract_basic;

pub fn router() -> Router {
    Router::new().route("/", post(issue_token).delete(revoke_token))
}

/// `POST /tokens`: exchange HTTP Basic credentials for a bearer token.
///
/// Reuses the current token while it has more than a minute of life left,
/// otherwise mints a fresh one.
pub async fn issue_token(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
) -> axum::response::Response {
    let Some((username, password)) = extract_basic(&headers) else {
        return errors::unauthorized();
    };

    let user = match services.users.by_username(&username).await {
        Ok(Some(user)) => user,
        Ok(None) => return errors::unauthorized(),
        Err(e) => return errors::user_store_error_to_response(e),
    };
    if !user.check_password(&password) {
        return errors::unauthorized();
    }

    let mut user = user;
    let token = user.issue_token(Utc::now());
    if let Err(e) = services.users.update(&user).await {
        return errors::user_store_error_to_response(e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "token": token.value,
            "expires_at": token.expires_at.to_rfc3339(),
        })),
    )
        .into_response()
}

/// `DELETE /tokens`: revoke the token used to authenticate this request.
pub async fn revoke_token(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
) -> axum::response::Response {
    let mut user = current.user().clone();
    user.revoke_token(Utc::now());
    match services.users.update(&user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::user_store_error_to_response(e),
    }
}
