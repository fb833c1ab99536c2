pub mod v1;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::health;
use crate::infra::AppState;

/// Build the full application router: banner, health, and the versioned
/// API surface.
pub fn create_app(state: AppState) -> Router {
    let cors = build_cors(&state);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .nest("/api/v1", v1::create_v1_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors(state: &AppState) -> CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin};

    let origins = &state.config.cors_allowed_origins;
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::any())
        .allow_headers(AllowHeaders::any())
}
