use axum::Router;

pub mod system;
pub mod tasks;
pub mod tokens;
pub mod users;

/// Router for all API endpoints (auth is per-handler: protected handlers
/// extract [`crate::context::CurrentUser`]).
pub fn router() -> Router {
    Router::new()
        .nest("/users", users::router())
        .nest("/tokens", tokens::router())
        .nest("/tasks", tasks::router())
}
