//! Middleware for the HTTP surface.

use axum::{extract::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Create CORS middleware.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware.
///
/// Requests against a conversation carry its id in the log line, so event
/// intake and notification receipt for one call can be followed together.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    info!(
        method = %method,
        path = %path,
        conversation_id = conversation_id_from_path(&path).unwrap_or("-"),
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// The conversation id segment of an event or webhook path.
pub fn conversation_id_from_path(path: &str) -> Option<&str> {
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["v1", "conversations", id, "events"] | ["v1", "webhook", id] if !id.is_empty() => {
            Some(*id)
        }
        _ => None,
    }
}
