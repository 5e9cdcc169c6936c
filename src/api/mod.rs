// HTTP API

mod health;
pub mod lamps;

pub use health::{create_health_router, HealthResponse};
pub use lamps::{create_lamp_router, ApiError, LampAppState, LampResponse, ListLampsResponse};

use crate::repository::LampRepository;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application router over a repository
pub fn create_app(repository: Arc<dyn LampRepository>) -> Router {
    let state = Arc::new(LampAppState { repository });

    create_lamp_router(Arc::clone(&state))
        .merge(create_health_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
