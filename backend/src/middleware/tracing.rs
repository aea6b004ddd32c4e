//! Request tracing middleware

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

static REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Logs every request with method, path, status and latency. An incoming
/// `x-request-id` is reused, otherwise one is generated; either way it is
/// echoed on the response.
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let request_id = request
        .headers()
        .get(&REQUEST_ID)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty() && s.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();
    tracing::debug!(parent: &span, client_ip = ?client_ip, "Request started");

    let mut response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    if response.status().is_server_error() {
        tracing::error!(parent: &span, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        tracing::warn!(parent: &span, status, duration_ms, "Request rejected");
    } else {
        tracing::info!(parent: &span, status, duration_ms, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID.clone(), value);
    }
    response
}
