//! Header filtering between the inbound and upstream legs.

use axum::http::header::{self, HeaderMap, HeaderName};

/// Connection-scoped headers that must not cross a proxy (RFC 9110 §7.6.1).
static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Headers forwarded from the inbound request to the upstream.
///
/// `host` is set by the transport from the upstream URL and `content-length`
/// is recomputed from the forwarded body.
pub fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    filter(headers, |name| {
        !is_hop_by_hop(name) && name != header::HOST && name != header::CONTENT_LENGTH
    })
}

/// Headers kept from an upstream response.
///
/// `content-length` is dropped because the body may be rewritten.
pub fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    filter(headers, |name| !is_hop_by_hop(name) && name != header::CONTENT_LENGTH)
}

fn filter(headers: &HeaderMap, keep: impl Fn(&HeaderName) -> bool) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if keep(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}
