//! Root-relative reference rewriting for proxies mounted below `/`.
//!
//! A page served from `http://origin/` refers to `/style.css`; served through a
//! proxy mounted at `/proxy`, that reference must become `/proxy/style.css`.
//!
//! Matching is a byte-level pattern over `src="/`, `href="/` and `action="/`
//! (either quote). It does not parse HTML, so references produced by scripts,
//! `srcset`, CSS `url(...)` and the like are left alone, and attribute-like text
//! outside tags is rewritten too. Protocol-relative `//host/...` references are
//! never touched.

use axum::http::header;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::proxy::response::ProxyResponse;

static ROOT_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:src|action|href)=["']/"#).expect("valid reference pattern"));

/// The path the proxy is mounted under.
///
/// Everything in `original_path` before the rightmost occurrence of
/// `normalized_path`. If the normalized path does not occur at all the whole
/// original path is returned.
pub fn mount_prefix<'a>(original_path: &'a str, normalized_path: &str) -> &'a str {
    original_path
        .rsplit_once(normalized_path)
        .map(|(head, _)| head)
        .unwrap_or(original_path)
}

/// Insert `prefix` in front of every root-relative reference in `body`.
///
/// Returns `None` when nothing matched.
pub fn rewrite_body(body: &[u8], prefix: &str) -> Option<Vec<u8>> {
    let mut out: Option<Vec<u8>> = None;
    let mut copied = 0;

    for found in ROOT_REFERENCE.find_iter(body) {
        if body.get(found.end()) == Some(&b'/') {
            continue;
        }
        let slash = found.end() - 1;
        let buf = out.get_or_insert_with(|| Vec::with_capacity(body.len() + prefix.len() * 8));
        buf.extend_from_slice(&body[copied..slash]);
        buf.extend_from_slice(prefix.as_bytes());
        copied = slash;
    }

    out.map(|mut buf| {
        buf.extend_from_slice(&body[copied..]);
        buf
    })
}

/// Rewrite the response body in place.
///
/// Bodies with a non-identity `Content-Encoding` are compressed bytes and are
/// left untouched.
pub fn rewrite(response: &mut ProxyResponse, prefix: &str) {
    let encoded = response
        .headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.eq_ignore_ascii_case("identity"));
    if encoded {
        tracing::debug!("Skipping rewrite of encoded response body");
        return;
    }

    if let Some(rewritten) = rewrite_body(&response.body, prefix) {
        response.body = Bytes::from(rewritten);
    }
}
