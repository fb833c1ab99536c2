use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::errors::AppResult;
use crate::infra::AppState;

/// GET / — service banner.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "harvest-server",
        "version": env!("CARGO_PKG_VERSION"),
        "api": "/api/v1",
    }))
}

/// GET /health — verifies a pooled store connection.
pub async fn health(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.db.ping().await?;
    let pool = state.db.pool_stats();

    Ok(Json(json!({
        "status": "ok",
        "database": {
            "pool_size": pool.size,
            "idle_connections": pool.idle,
            "max_connections": pool.max_size,
        },
    })))
}
