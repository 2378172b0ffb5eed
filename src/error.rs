use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::signature::SignatureError;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid or expired signature: {0}")]
    Unauthorized(#[from] SignatureError),

    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Search timed out after {timeout_ms}ms: {path}")]
    SearchTimeout { path: String, timeout_ms: u128 },

    #[error("Stat failed: {0}")]
    Stat(std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_)
            | GatewayError::InvalidPath(_)
            | GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) | GatewayError::SearchTimeout { .. } => {
                StatusCode::NOT_FOUND
            }
            GatewayError::Stat(_) | GatewayError::Io(_) | GatewayError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing body. Never carries filesystem paths or io details.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Unauthorized(_) => "Invalid or expired signature".to_string(),
            GatewayError::BadRequest(msg) => (*msg).to_string(),
            GatewayError::InvalidPath(_) => "Invalid path".to_string(),
            GatewayError::Forbidden(_) => "Forbidden".to_string(),
            GatewayError::NotFound(_) | GatewayError::SearchTimeout { .. } => {
                "File not found".to_string()
            }
            GatewayError::Stat(_) | GatewayError::Io(_) | GatewayError::Config(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, self.public_message()).into_response()
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
