//! Health check endpoint

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use shellcache_core::LifecycleState;

use crate::state::AppState;

/// Health status response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub lifecycle: LifecycleState,
}

/// Health check handler
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let lifecycle = state.lifecycle.state();
    let status = if lifecycle == LifecycleState::Activated {
        "healthy"
    } else {
        "starting"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        lifecycle,
    })
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/_shellcache/health", get(health))
}
