use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use ripple_core::JobId;
use ripple_tasks::{broker_job, task_progress};

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::CurrentUser;

pub fn router() -> Router {
    Router::new()
        .route("/", post(launch_task).get(list_tasks))
        .route("/:id", get(get_task))
}

/// `POST /tasks`: launch a background job for the current user.
///
/// Refuses a second concurrent launch of the same work name (409): the store
/// only answers the lookup, the guard policy lives here. On success the job is
/// already queued; 202 reflects that nothing has run yet.
pub async fn launch_task(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
    Json(body): Json<dto::LaunchTaskRequest>,
) -> axum::response::Response {
    let name = body.name.trim();
    if name.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "name is required");
    }

    match services.tasks.find_incomplete_by_name(current.id(), name).await {
        Ok(Some(_)) => {
            return errors::json_error(
                StatusCode::CONFLICT,
                "duplicate_task",
                format!("a '{name}' task is already in progress"),
            )
        }
        Ok(None) => {}
        Err(e) => return errors::task_store_error_to_response(e),
    }

    let mut tx = match services.tasks.begin().await {
        Ok(tx) => tx,
        Err(e) => return errors::task_store_error_to_response(e),
    };
    let task = match services
        .launcher
        .launch(tx.as_mut(), current.id(), name, &body.description, body.args)
        .await
    {
        Ok(task) => task,
        Err(e) => return errors::launch_error_to_response(e),
    };
    if let Err(e) = tx.commit().await {
        return errors::task_store_error_to_response(e);
    }

    tracing::info!(job_id = %task.id, name = %task.name, user_id = %task.owner, "task launched");

    let progress = task_progress(services.broker.as_ref(), &task).await;
    (
        StatusCode::ACCEPTED,
        Json(dto::task_to_json(&task, progress, None)),
    )
        .into_response()
}

/// `GET /tasks`: the current user's incomplete tasks with live progress.
pub async fn list_tasks(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
) -> axum::response::Response {
    let tasks = match services.tasks.list_incomplete(current.id()).await {
        Ok(tasks) => tasks,
        Err(e) => return errors::task_store_error_to_response(e),
    };

    let mut items = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let progress = task_progress(services.broker.as_ref(), task).await;
        items.push(dto::task_to_json(task, progress, None));
    }

    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

/// `GET /tasks/:id`: one task, owner-scoped. A foreign task id answers 404
/// rather than 403 so ids don't leak.
pub async fn get_task(
    Extension(services): Extension<Arc<AppServices>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = JobId::from_string(id);
    let task = match services.tasks.get(&id).await {
        Ok(Some(task)) if task.owner == current.id() => task,
        Ok(_) => return errors::not_found("task not found"),
        Err(e) => return errors::task_store_error_to_response(e),
    };

    let progress = task_progress(services.broker.as_ref(), &task).await;
    let status = broker_job(services.broker.as_ref(), &task)
        .await
        .map(|handle| handle.status);

    (
        StatusCode::OK,
        Json(dto::task_to_json(&task, progress, status)),
    )
        .into_response()
}
