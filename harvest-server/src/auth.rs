//! API-key authentication for worker calls.
//!
//! Workers carry their key in the `X-API-Key` header. Every authenticated
//! call doubles as a heartbeat, so a busy worker never goes stale between
//! explicit heartbeats.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::infra::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// The resolved caller, inserted as a request extension. `None` when auth
/// is disabled for the deployment.
#[derive(Debug, Clone, Copy)]
pub struct WorkerIdentity(pub Option<Uuid>);

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.config.auth_enabled {
        request.extensions_mut().insert(WorkerIdentity(None));
        return Ok(next.run(request).await);
    }

    let key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("API key required"))?;

    let worker = state
        .db
        .workers()
        .get_by_api_key(key)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid API key"))?;

    // Any authenticated call refreshes liveness; a failed refresh is not
    // worth failing the request over.
    if let Err(e) = state.db.workers().heartbeat(worker.id).await {
        warn!("Heartbeat refresh failed for worker {}: {e}", worker.id);
    }

    request.extensions_mut().insert(WorkerIdentity(Some(worker.id)));
    Ok(next.run(request).await)
}
