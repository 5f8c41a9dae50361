//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/upload", post(handlers::upload_batch))
        .layer(DefaultBodyLimit::max(state.config.server.max_body_bytes));

    let api_routes = Router::new()
        .route("/upload/session/{session_id}", get(handlers::get_session))
        .route("/upload/preflight", post(handlers::preflight))
        .route("/status", get(handlers::server_status))
        // Health check (unauthenticated, for load balancers and probes)
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(upload_routes).merge(api_routes);

    // When enabled, this endpoint should be network-restricted to the
    // Prometheus scraper.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
