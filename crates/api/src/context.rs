use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;

use ripple_core::UserId;
use ripple_users::User;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::middleware::extract_bearer;

/// The authenticated user for a request.
///
/// Extracting this is what makes a route protected: the bearer token is
/// resolved through the user store (an expired token behaves exactly like a
/// missing one), and the user's `last_seen` is touched on the way in.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    user: User,
}

impl CurrentUser {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = axum::response::Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let services = parts
            .extensions
            .get::<Arc<AppServices>>()
            .cloned()
            .ok_or_else(|| {
                errors::json_error(
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "misconfigured",
                    "application services not available",
                )
            })?;

        let token = extract_bearer(&parts.headers).ok_or_else(errors::unauthorized)?;
        let now = Utc::now();

        let user = services
            .users
            .by_token(token, now)
            .await
            .map_err(errors::user_store_error_to_response)?
            .ok_or_else(errors::unauthorized)?;

        // Best effort: a failed activity touch must not fail the request.
        if let Err(e) = services.users.touch_last_seen(user.id, now).await {
            tracing::debug!(user_id = %user.id, error = %e, "failed to touch last_seen");
        }

        Ok(CurrentUser::new(user))
    }
}
