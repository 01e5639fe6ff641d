//! Request spans.
//!
//! Every inbound request gets one span carrying its request ID, so log lines
//! from the proxy pipeline, the upstream call and the recorder correlate.

use axum::body::Body;
use axum::http::Request;
use tracing::Span;

use crate::http::request::request_id;

/// Span maker for `TraceLayer::make_span_with`.
pub fn request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request),
        method = %request.method(),
        uri = %request.uri(),
    )
}
