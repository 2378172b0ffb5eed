//! HTTP server module
//!
//! - Axum router with the stream, health and version endpoints
//! - Signed stream handler
//! - Range-capable file responses
//! - CORS and request logging middleware

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod serve;

pub use routes::create_router;
