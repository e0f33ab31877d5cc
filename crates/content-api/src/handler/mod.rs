//! HTTP handlers for the Content API
//!
//! Every route sits behind the OpenAPI guard, so handlers only ever see
//! requests that already match the document.

mod middleware;

pub use middleware::{request_logging_middleware, REQUEST_ID_HEADER};

use axum::{
    body::Bytes,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use openapi_guard::{validate_request, write_json, MessageResponse, RequestGuard, RouteError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Create the router with validation, request logging and HTTP tracing
pub fn create_router(guard: RequestGuard) -> Router {
    Router::new()
        .route("/content", post(post_content))
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(from_fn_with_state(guard, validate_request))
        .layer(from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Accept new content
///
/// The guard has already validated the body, so it is only inspected here
/// for logging and never rejected.
async fn post_content(body: Bytes) -> StatusCode {
    let content = serde_json::from_slice::<Value>(&body).ok();
    let name = content
        .as_ref()
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let items = content
        .as_ref()
        .and_then(|c| c.get("items"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    tracing::info!(name = %name, items, bytes = body.len(), "Content accepted");
    StatusCode::NO_CONTENT
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Only reached when a route is registered here but missing from the document
async fn not_found() -> Response {
    write_json(
        StatusCode::NOT_FOUND,
        &MessageResponse::new(RouteError::NotFound.to_string()),
    )
}
