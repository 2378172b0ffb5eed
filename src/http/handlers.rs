//! HTTP request handlers

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Method},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::signature;
use crate::state::AppState;

use super::serve::serve_file;

/// Query parameters of `/stream`
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub path: Option<String>,
    pub signature: Option<String>,
}

fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Stream a file located on one of the mounts.
///
/// The signature is checked before any filesystem access.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Response> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("stream", request_id = %request_id);

    async move {
        let (Some(path), Some(sig)) = (required(query.path), required(query.signature)) else {
            return Err(GatewayError::BadRequest("Missing path or signature"));
        };
        tracing::debug!("Stream request for {}", path);

        let claims = signature::verify(&sig, state.secret()).map_err(|e| {
            tracing::warn!("Rejected signature: {}", e);
            GatewayError::from(e)
        })?;
        tracing::debug!(
            item_id = %claims.item_id,
            media_id = %claims.media_id,
            "Signature verified"
        );

        let resolved = state.resolver.resolve(&path).await?;
        serve_file(&method, &headers, resolved).await
    }
    .instrument(span)
    .await
}

/// Health check response body
#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub mounts: usize,
    pub cache_entries: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
        mounts: state.resolver.mounts().len(),
        cache_entries: state.resolver.cache().len(),
    })
}

/// Version endpoint
pub async fn version_check() -> String {
    format!("{} v{}", crate::APP_NAME, crate::VERSION)
}
