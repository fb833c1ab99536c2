//! HTTP surface of the harvest coordination server: axum handlers and
//! routes, API-key auth, env-driven configuration, the background
//! stale-task sweep, and the operator notifier. All coordination logic
//! lives in `harvest-core`; this crate is the stateless edge over it.

pub mod api;
pub mod auth;
pub mod errors;
pub mod handlers;
pub mod infra;
pub mod notify;
pub mod routes;
pub mod sweep;

pub use errors::{AppError, AppResult};
pub use infra::{AppState, Config};
pub use routes::create_app;
