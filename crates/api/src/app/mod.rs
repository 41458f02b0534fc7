//! HTTP API application wiring (Axum router + service wiring).
//!
//! If you're new to Rust, this folder is structured like:
//! - `services.rs`: infrastructure wiring (stores, broker, launcher)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app() -> Router {
    let services = Arc::new(services::build_services().await);
    build_app_with_services(services)
}

/// Build the router against pre-wired services (used by tests to share the
/// in-memory stores with an in-process worker).
pub fn build_app_with_services(services: Arc<services::AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(Extension(services))
        .layer(ServiceBuilder::new())
}
