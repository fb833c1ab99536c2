use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::auth::auth_middleware;
use crate::handlers::{documents, tasks, workers};
use crate::infra::AppState;

/// Create all v1 API routes.
pub fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        // Public: a worker has no key before it registers.
        .route("/workers/register", post(workers::register_worker))
        .merge(create_worker_routes(state))
}

/// Routes behind API-key auth (a pass-through when auth is disabled).
fn create_worker_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Worker fleet
        .route("/workers/heartbeat", post(workers::heartbeat))
        .route("/workers", get(workers::workers_summary))
        .route("/workers/{id}/statistics", get(workers::worker_statistics))
        .route("/workers/{id}/activity", get(workers::worker_activity))
        // Task lifecycle
        .route("/tasks/request", post(tasks::request_task))
        .route("/tasks/{id}/start", post(tasks::start_task))
        .route("/tasks/create", post(tasks::create_task))
        .route("/tasks/complete", post(tasks::complete_task))
        .route("/tasks/reset-stale", post(tasks::reset_stale))
        .route("/tasks/item-start", post(tasks::item_start))
        .route("/tasks", get(tasks::tasks_summary))
        .route("/tasks/{id}", get(tasks::get_task))
        .route("/tasks/{id}/statistics", get(tasks::task_statistics))
        // Document registry
        .route("/documents/register", post(documents::register_document))
        .route("/documents/{system_id}", get(documents::get_document))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}
