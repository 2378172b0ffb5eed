//! HTTP middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Request logging middleware
///
/// Logs the path only: the query carries the signature.
pub async fn request_logger(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_success() || status.is_redirection() {
        info!("{} {} {} in {:?}", method, path, status, duration);
    } else {
        warn!("{} {} {} in {:?}", method, path, status, duration);
    }

    response
}
