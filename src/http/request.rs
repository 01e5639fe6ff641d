//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a request ID when the client did not send one
//! - Buffer the inbound body up to the configured limit
//! - Convert the axum request into the proxy's `InboundRequest`
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The body is an opaque byte sequence; it is never decoded
//! - Oversized bodies are rejected with 413 before the proxy sees them

use axum::body::Body;
use axum::http::{HeaderName, Request, StatusCode};

use crate::proxy::{InboundRequest, ProxyResponse, QueryString};

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Buffer an axum request into an `InboundRequest`.
///
/// `original_path` is the full path seen by the router, before the mount
/// path is stripped.
pub async fn into_inbound(
    request: Request<Body>,
    max_body_bytes: usize,
) -> Result<InboundRequest, ProxyResponse> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, max_body_bytes).await.map_err(|e| {
        tracing::warn!(error = %e, limit = max_body_bytes, "Rejecting inbound body");
        ProxyResponse::text(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("request body exceeds {} bytes", max_body_bytes),
        )
    })?;

    Ok(InboundRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        original_path: parts.uri.path().to_string(),
        query: QueryString::from_raw(parts.uri.query()),
        headers: parts.headers,
        body,
    })
}

/// The part of a raw request path below `mount` (given without a trailing
/// slash). Percent-encoding is preserved.
pub fn target_path<'a>(path: &'a str, mount: &str) -> &'a str {
    path.strip_prefix(mount).unwrap_or(path)
}

/// Request ID carried by a request, for logging.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
