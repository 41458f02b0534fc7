use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use ripple_core::UserId;
use ripple_users::{NewUser, User, UserUpdate};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_user).get(list_users))
        .route("/:id", get(get_user).put(update_user))
        .route("/:id/followers", get(list_followers))
        .route("/:id/following", get(list_following))
        .route("/:id/follow", post(follow_user).delete(unfollow_user))
}

/// `POST /users`: open registration, no auth.
pub async fn register_user(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    let user = match User::register(body, Utc::now()) {
        Ok(user) => user,
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.users.insert(&user).await {
        return errors::user_store_error_to_response(e);
    }

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    (StatusCode::CREATED, Json(dto::user_to_json(&user))).into_response()
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(id) = id.parse::<UserId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id");
    };
    match services.users.get(id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(dto::user_to_json(&user))).into_response(),
        Ok(None) => errors::not_found("user not found"),
        Err(e) => errors::user_store_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    _current: CurrentUser,
    Query(params): Query<dto::PageParams>,
) -> axum::response::Response {
    match services.users.list(params.request()).await {
        Ok(page) => (
            StatusCode::OK,
            Json(dto::collection_to_json(&page, "/users", dto::user_to_json)),
        )
            .into_response(),
        Err(e) => errors::user_store_error_to_response(e),
    }
}

/// `PUT /users/:id`: self-service profile update through the allow-listed
/// field mapper; you can only update your own account.
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<UserUpdate>,
) -> axum::response::Response {
    let Ok(id) = id.parse::<UserId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id");
    };
    if id != current.id() {
        return errors::json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "cannot update another user",
        );
    }

    let mut user = current.user().clone();
    if let Err(e) = user.apply_update(body) {
        return errors::domain_error_to_response(e);
    }
    if let Err(e) = services.users.update(&user).await {
        return errors::user_store_error_to_response(e);
    }

    (StatusCode::OK, Json(dto::user_to_json(&user))).into_response()
}

pub async fn list_followers(
    Extension(services): Extension<Arc<AppServices>>,
    _current: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<dto::PageParams>,
) -> axum::response::Response {
    follow_listing(services, id, params, FollowDirection::Followers).await
}

pub async fn list_following(
    Extension(services): Extension<Arc<AppServices>>,
    _current: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<dto::PageParams>,
) -> axum::response::Response {
    follow_listing(services, id, params, FollowDirection::Following).await
}

enum FollowDirection {
    Followers,
    Following,
}

async fn follow_listing(
    services: Arc<AppServices>,
    id: String,
    params: dto::PageParams,
    direction: FollowDirection,
) -> axum::response::Response {
    let Ok(id) = id.parse::<UserId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id");
    };
    match services.users.get(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return errors::not_found("user not found"),
        Err(e) => return errors::user_store_error_to_response(e),
    }

    let (result, segment) = match direction {
        FollowDirection::Followers => (
            services.users.followers(id, params.request()).await,
            "followers",
        ),
        FollowDirection::Following => (
            services.users.following(id, params.request()).await,
            "following",
        ),
    };

    match result {
        Ok(page) => {
            let base = format!("/users/{id}/{segment}");
            (
                StatusCode::OK,
                Json(dto::collection_to_json(&page, &base, dto::user_to_json)),
            )
                .into_response()
        }
        Err(e) => errors::user_store_error_to_response(e),
    }
}

/// `POST /users/:id/follow`: current user starts following `:id`.
pub async fn follow_user(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(target) = id.parse::<UserId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id");
    };
    if target == current.id() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "self_follow",
            "cannot follow yourself",
        );
    }
    match services.users.get(target).await {
        Ok(Some(_)) => {}
        Ok(None) => return errors::not_found("user not found"),
        Err(e) => return errors::user_store_error_to_response(e),
    }

    match services.users.follow(current.id(), target).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::user_store_error_to_response(e),
    }
}

/// `DELETE /users/:id/follow`: current user stops following `:id`.
pub async fn unfollow_user(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(target) = id.parse::<UserId>() else {
        return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid user id");
    };
    match services.users.unfollow(current.id(), target).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::user_store_error_to_response(e),
    }
}
