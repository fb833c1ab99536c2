use std::time::Duration;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use tracing::info;
use uuid::Uuid;

use harvest_core::{CacheKeys, Task, TaskCounters, TaskDownloadStats, TaskStatus};

use crate::api::models::{
    AckResponse, ItemStartRequest, ItemStartResponse, LeasedTaskResponse, ResetStaleResponse,
    TaskCompleteRequest, TaskCreateRequest, TaskCreateResponse, TasksQuery,
    TasksSummaryResponse,
};
use crate::auth::WorkerIdentity;
use crate::errors::{AppError, AppResult};
use crate::infra::AppState;
use crate::notify::{self, FailureEvent};

/// TTL for tasks still moving through the lifecycle; terminal tasks keep
/// the configured TTL.
const ACTIVE_TASK_TTL: Duration = Duration::from_secs(5);

const DEFAULT_LIST_LIMIT: i64 = 100;

async fn caller_worker_id(state: &AppState, identity: WorkerIdentity) -> AppResult<Uuid> {
    match identity.0 {
        Some(id) => Ok(id),
        None => Ok(state.db.workers().anonymous().await?),
    }
}

/// POST /tasks/request — lease the oldest pending task and start it.
pub async fn request_task(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
) -> AppResult<Json<LeasedTaskResponse>> {
    let worker_id = caller_worker_id(&state, identity).await?;

    let Some(task) = state.db.tasks().lease(worker_id).await? else {
        return Err(AppError::not_found("No pending tasks available"));
    };

    // The fleet starts scraping immediately after a successful lease, so
    // the server stamps the start on its behalf.
    state.db.tasks().start(task.id).await?;

    state.cache_delete(&CacheKeys::task(task.id)).await;
    state
        .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
        .await;

    Ok(Json(LeasedTaskResponse {
        task_id: task.id,
        search_params: task.search_params,
        start_page: task.start_page,
        max_documents: task.max_documents,
        status: TaskStatus::InProgress.to_string(),
    }))
}

/// POST /tasks/{id}/start — explicit start for workers that defer work
/// after leasing. Idempotent; leasing already starts the task on their
/// behalf.
pub async fn start_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<AckResponse>> {
    state.db.tasks().start(task_id).await?;

    state.cache_delete(&CacheKeys::task(task_id)).await;
    state
        .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
        .await;

    Ok(Json(AckResponse {
        success: true,
        message: format!("Task {task_id} started"),
    }))
}

/// POST /tasks/complete — record the worker's result report.
pub async fn complete_task(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
    Json(request): Json<TaskCompleteRequest>,
) -> AppResult<Json<AckResponse>> {
    let task = state
        .db
        .tasks()
        .get(request.task_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Task {} not found", request.task_id)))?;

    // Ownership is exclusive while the task is live.
    if let (Some(owner), Some(caller)) = (task.worker_id, identity.0) {
        if owner != caller {
            return Err(AppError::forbidden("Task does not belong to this worker"));
        }
    }

    let completed = state
        .db
        .tasks()
        .complete(
            request.task_id,
            TaskCounters {
                downloaded: request.documents_downloaded,
                failed: request.documents_failed,
                skipped: request.documents_skipped,
            },
            request.result_summary,
            request.error_message.clone(),
        )
        .await?;

    state.cache_delete(&CacheKeys::task(request.task_id)).await;
    state
        .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
        .await;
    if let Some(worker_id) = completed.worker_id {
        state
            .cache_delete(&CacheKeys::worker_statistics(worker_id))
            .await;
    }

    if let Some(message) = request.error_message {
        notify::dispatch(
            state.notifier.clone(),
            FailureEvent {
                message,
                task_id: request.task_id,
                worker_id: completed.worker_id,
            },
        );
    }

    Ok(Json(AckResponse {
        success: true,
        message: format!("Task {} completed", request.task_id),
    }))
}

/// POST /tasks/create
pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<TaskCreateRequest>,
) -> AppResult<Json<TaskCreateResponse>> {
    let task_id = state
        .db
        .tasks()
        .create(request.search_params, request.start_page, request.max_documents)
        .await?;

    state
        .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
        .await;

    Ok(Json(TaskCreateResponse {
        task_id,
        message: "Task created".to_string(),
    }))
}

/// GET /tasks — counts by status plus a recent-first list, optionally
/// filtered. Cached per filter variant.
pub async fn tasks_summary(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> AppResult<Json<TasksSummaryResponse>> {
    let cache_key = CacheKeys::tasks_summary(query.status.as_deref());
    if let Some(cached) = state.cache_get::<TasksSummaryResponse>(&cache_key).await {
        return Ok(Json(cached));
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000);
    let counts = state.db.tasks().status_counts().await?;
    let tasks = match query.status.as_deref() {
        Some(raw) => {
            let status: TaskStatus = raw
                .parse()
                .map_err(|_| AppError::bad_request(format!("Unknown task status: {raw}")))?;
            state.db.tasks().list_by_status(status, limit).await?
        }
        None => state.db.tasks().list_recent(limit).await?,
    };

    let summary = TasksSummaryResponse {
        total_tasks: counts.total(),
        pending: counts.pending,
        assigned: counts.assigned,
        in_progress: counts.in_progress,
        completed: counts.completed,
        failed: counts.failed,
        tasks,
    };

    state
        .cache_put(&cache_key, &summary, state.config.cache_ttl_tasks())
        .await;
    Ok(Json(summary))
}

/// GET /tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Task>> {
    let cache_key = CacheKeys::task(task_id);
    if let Some(cached) = state.cache_get::<Task>(&cache_key).await {
        return Ok(Json(cached));
    }

    let task = state
        .db
        .tasks()
        .get(task_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Task {task_id} not found")))?;

    let ttl = if task.status.is_active() {
        ACTIVE_TASK_TTL
    } else {
        state.config.cache_ttl_tasks()
    };
    state.cache_put(&cache_key, &task, ttl).await;

    Ok(Json(task))
}

/// GET /tasks/{id}/statistics — the speed/ETA block.
pub async fn task_statistics(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<TaskDownloadStats>> {
    let stats = state
        .db
        .tasks()
        .download_statistics(task_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Task {task_id} not found")))?;
    Ok(Json(stats))
}

/// POST /tasks/item-start — a worker announces one item download.
pub async fn item_start(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
    Json(request): Json<ItemStartRequest>,
) -> AppResult<Json<ItemStartResponse>> {
    if state.db.tasks().get(request.task_id).await?.is_none() {
        return Err(AppError::not_found(format!(
            "Task {} not found",
            request.task_id
        )));
    }

    state
        .db
        .tasks()
        .record_item_start(
            request.task_id,
            &request.document_id,
            request.reg_number.as_deref(),
            identity.0,
        )
        .await?;

    let statistics = state.db.tasks().download_statistics(request.task_id).await?;

    Ok(Json(ItemStartResponse {
        success: true,
        message: format!("Recorded download start for {}", request.document_id),
        statistics,
    }))
}

/// POST /tasks/reset-stale — administrative counterpart of the sweep loop.
pub async fn reset_stale(State(state): State<AppState>) -> AppResult<Json<ResetStaleResponse>> {
    let reset_count = state
        .db
        .tasks()
        .reset_stale(state.config.task_timeout())
        .await?;

    if reset_count > 0 {
        state
            .cache_delete_pattern(CacheKeys::tasks_summary_pattern())
            .await;
        info!("Administrative reset of {} stale tasks", reset_count);
    }

    Ok(Json(ResetStaleResponse {
        reset_count,
        message: format!("{reset_count} stale tasks reset to pending"),
    }))
}
