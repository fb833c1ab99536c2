use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use harvest_core::{CacheKeys, WorkerActivity, WorkerStatistics};

use crate::api::models::{
    AckResponse, RegisterWorkerRequest, RegisterWorkerResponse, WorkerView,
    WorkersSummaryResponse,
};
use crate::auth::WorkerIdentity;
use crate::errors::{AppError, AppResult};
use crate::infra::AppState;

/// POST /workers/register — public; idempotent per api_key.
pub async fn register_worker(
    State(state): State<AppState>,
    Json(request): Json<RegisterWorkerRequest>,
) -> AppResult<Json<RegisterWorkerResponse>> {
    if request.name.trim().is_empty() {
        return Err(AppError::bad_request("Worker name must not be empty"));
    }

    let worker_id = state
        .db
        .workers()
        .register(
            &request.name,
            request.host.as_deref(),
            request.api_key.as_deref(),
        )
        .await?;

    Ok(Json(RegisterWorkerResponse {
        worker_id,
        message: format!("Worker {} registered", request.name),
    }))
}

/// POST /workers/heartbeat — the caller is resolved from its API key.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
) -> AppResult<Json<AckResponse>> {
    let Some(worker_id) = identity.0 else {
        // Auth disabled: nothing to refresh, the call is a liveness probe.
        return Ok(Json(AckResponse {
            success: true,
            message: "Heartbeat acknowledged (anonymous)".to_string(),
        }));
    };

    if !state.db.workers().heartbeat(worker_id).await? {
        return Err(AppError::not_found(format!("Worker {worker_id} not found")));
    }

    Ok(Json(AckResponse {
        success: true,
        message: "Heartbeat acknowledged".to_string(),
    }))
}

/// GET /workers — counts plus the fleet list with derived liveness.
pub async fn workers_summary(
    State(state): State<AppState>,
) -> AppResult<Json<WorkersSummaryResponse>> {
    let threshold = state.config.heartbeat_threshold();
    let now = Utc::now();

    let workers: Vec<WorkerView> = state
        .db
        .workers()
        .list_all()
        .await?
        .into_iter()
        .map(|worker| WorkerView {
            id: worker.id,
            status: worker.effective_status(threshold, now),
            name: worker.name,
            host: worker.host,
            last_heartbeat: worker.last_heartbeat,
            total_tasks_completed: worker.total_tasks_completed,
            total_documents_downloaded: worker.total_documents_downloaded,
        })
        .collect();

    let active_workers = workers
        .iter()
        .filter(|w| w.status == harvest_core::WorkerStatus::Active)
        .count();

    Ok(Json(WorkersSummaryResponse {
        total_workers: workers.len(),
        active_workers,
        workers,
    }))
}

/// GET /workers/{id}/statistics — cached aggregate view.
pub async fn worker_statistics(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
) -> AppResult<Json<WorkerStatistics>> {
    let cache_key = CacheKeys::worker_statistics(worker_id);
    if let Some(cached) = state.cache_get::<WorkerStatistics>(&cache_key).await {
        return Ok(Json(cached));
    }

    let stats = state
        .db
        .workers()
        .statistics(worker_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Worker {worker_id} not found")))?;

    state
        .cache_put(&cache_key, &stats, state.config.cache_ttl_statistics())
        .await;
    Ok(Json(stats))
}

/// GET /workers/{id}/activity — near-real-time, deliberately uncached.
pub async fn worker_activity(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
) -> AppResult<Json<WorkerActivity>> {
    let activity = state
        .db
        .workers()
        .activity(worker_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Worker {worker_id} not found")))?;
    Ok(Json(activity))
}
