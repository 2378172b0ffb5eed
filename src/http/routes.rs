//! Axum router configuration

use axum::{
    http::{header, Method},
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{health_check, stream_handler, version_check};
use super::middleware::request_logger;

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::RANGE, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([
            header::CONTENT_RANGE,
            header::CONTENT_LENGTH,
            header::ACCEPT_RANGES,
            header::ETAG,
        ])
        .max_age(Duration::from_secs(3600))
}

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors_enabled = state.config.cors_enabled;

    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // GET routing also answers HEAD
        .route("/stream", get(stream_handler))
        .layer(middleware::from_fn(request_logger))
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router = router.layer(cors_layer());
    }

    router.with_state(state)
}
