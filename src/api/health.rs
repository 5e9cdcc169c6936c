use super::lamps::LampAppState;
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Active repository backend ("memory" or "sqlite")
    pub storage: &'static str,
}

/// Create health check router
pub fn create_health_router(state: Arc<LampAppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

/// GET /health - Liveness plus the backend in use
async fn health(State(state): State<Arc<LampAppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        storage: state.repository.backend(),
    })
}
