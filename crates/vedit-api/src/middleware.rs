//! HTTP middleware.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use tracing::{info, warn};
use uuid::Uuid;

/// Request ID as stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Attach an `X-Request-ID` to every request and response.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

/// Log one line per completed request; probes are skipped.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;

    if matches!(path.as_str(), "/health" | "/ready" | "/metrics") {
        return response;
    }

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;
    if status.is_server_error() {
        warn!(%method, %path, %status, duration_ms, request_id, "Request failed");
    } else {
        info!(%method, %path, %status, duration_ms, request_id, "Request completed");
    }

    response
}
