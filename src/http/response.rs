//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn the proxy's buffered `ProxyResponse` into an HTTP response
//!
//! # Design Decisions
//! - Content-Length is recomputed from the final (possibly rewritten) body
//! - Headers are copied verbatim, including repeated values

use axum::body::Body;
use axum::response::{IntoResponse, Response};

use crate::proxy::ProxyResponse;

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
