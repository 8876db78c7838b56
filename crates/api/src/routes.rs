use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::*;

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(get_snapshots))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
