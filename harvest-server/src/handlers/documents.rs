use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use harvest_core::{CacheKeys, Document};

use crate::api::models::{DocumentRegisterRequest, DocumentRegisterResponse};
use crate::auth::WorkerIdentity;
use crate::errors::{AppError, AppResult};
use crate::infra::AppState;

/// POST /documents/register — dedup, merge, classify, attribute.
pub async fn register_document(
    State(state): State<AppState>,
    Extension(identity): Extension<WorkerIdentity>,
    Json(request): Json<DocumentRegisterRequest>,
) -> AppResult<Json<DocumentRegisterResponse>> {
    let classification = state
        .classifier
        .classify(&request.metadata, request.search_params.as_ref());

    let outcome = state
        .db
        .documents()
        .register(&request.metadata, &classification, request.task_id, identity.0)
        .await?;

    // Registration closes the matching per-item progress row, feeding the
    // task's speed/ETA estimate.
    if let Some(task_id) = request.task_id {
        if let Some(item_id) = request.metadata.dedup_key() {
            state.db.tasks().record_item_complete(task_id, item_id).await?;
        }
    }

    state
        .cache_delete(&CacheKeys::document(outcome.system_id))
        .await;
    if let Some(worker_id) = identity.0 {
        state
            .cache_delete(&CacheKeys::worker_statistics(worker_id))
            .await;
    }

    let message = if outcome.newly_created {
        "Document registered"
    } else {
        "Document already known; metadata merged"
    };

    Ok(Json(DocumentRegisterResponse {
        system_id: outcome.system_id,
        external_id: request.metadata.external_id,
        reg_number: request.metadata.reg_number,
        classified: outcome.classification.is_classified(),
        classification: outcome.classification,
        message: message.to_string(),
    }))
}

/// GET /documents/{system_id}
pub async fn get_document(
    State(state): State<AppState>,
    Path(system_id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    let cache_key = CacheKeys::document(system_id);
    if let Some(cached) = state.cache_get::<Document>(&cache_key).await {
        return Ok(Json(cached));
    }

    let document = state
        .db
        .documents()
        .get_by_system_id(system_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Document {system_id} not found")))?;

    state
        .cache_put(&cache_key, &document, state.config.cache_ttl_documents())
        .await;
    Ok(Json(document))
}
