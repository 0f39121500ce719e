pub mod routes;

use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Public API plus the in-process PDE endpoint, with permissive CORS.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/price", post(routes::post_price))
        .route("/api/health", get(routes::get_health))
        .route("/api/counters", get(routes::get_counters))
        .route("/pde/price", post(routes::post_pde_price))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}
