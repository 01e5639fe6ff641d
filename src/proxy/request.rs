//! Inbound request model and normalization.
//!
//! # Responsibilities
//! - Hold the buffered inbound request (method, path, query, headers, body)
//! - Rewrite the path to the proxied target path before anything else runs
//! - Describe which HTTP methods the proxy is able to forward

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use bytes::Bytes;
use std::str::FromStr;

use crate::proxy::url::QueryString;

/// A fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Logical path. Equals the proxied target path once normalized.
    pub path: String,
    /// Full path as received by the host router, never rewritten.
    pub original_path: String,
    pub query: QueryString,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            original_path: path.clone(),
            path,
            query: QueryString::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: QueryString) -> Self {
        self.query = query;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// Ensure a target path is rooted.
pub fn normalize_path(target_path: &str) -> String {
    if target_path.starts_with('/') {
        target_path.to_string()
    } else {
        format!("/{}", target_path)
    }
}

/// Point the request's logical path at the proxied target path.
///
/// Method, query, headers and body are untouched, and so is `original_path`,
/// which later stages use to work out where the proxy is mounted.
pub fn normalize(mut request: InboundRequest, target_path: &str) -> InboundRequest {
    request.path = normalize_path(target_path);
    request
}

/// HTTP methods the proxy knows how to forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl ProxyMethod {
    pub const ALL: [ProxyMethod; 7] = [
        ProxyMethod::Get,
        ProxyMethod::Head,
        ProxyMethod::Post,
        ProxyMethod::Put,
        ProxyMethod::Patch,
        ProxyMethod::Delete,
        ProxyMethod::Options,
    ];

    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(ProxyMethod::Get),
            Method::HEAD => Some(ProxyMethod::Head),
            Method::POST => Some(ProxyMethod::Post),
            Method::PUT => Some(ProxyMethod::Put),
            Method::PATCH => Some(ProxyMethod::Patch),
            Method::DELETE => Some(ProxyMethod::Delete),
            Method::OPTIONS => Some(ProxyMethod::Options),
            _ => None,
        }
    }

    pub fn as_http(&self) -> Method {
        match self {
            ProxyMethod::Get => Method::GET,
            ProxyMethod::Head => Method::HEAD,
            ProxyMethod::Post => Method::POST,
            ProxyMethod::Put => Method::PUT,
            ProxyMethod::Patch => Method::PATCH,
            ProxyMethod::Delete => Method::DELETE,
            ProxyMethod::Options => Method::OPTIONS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMethod::Get => "GET",
            ProxyMethod::Head => "HEAD",
            ProxyMethod::Post => "POST",
            ProxyMethod::Put => "PUT",
            ProxyMethod::Patch => "PATCH",
            ProxyMethod::Delete => "DELETE",
            ProxyMethod::Options => "OPTIONS",
        }
    }

    /// Whether the inbound body is forwarded upstream.
    ///
    /// DELETE bodies are forwarded only when present.
    pub fn forwards_body(&self, body: &Bytes) -> bool {
        match self {
            ProxyMethod::Post | ProxyMethod::Put | ProxyMethod::Patch => true,
            ProxyMethod::Delete => !body.is_empty(),
            ProxyMethod::Get | ProxyMethod::Head | ProxyMethod::Options => false,
        }
    }
}

impl FromStr for ProxyMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = Method::from_bytes(s.trim().to_ascii_uppercase().as_bytes())
            .map_err(|e| e.to_string())?;
        ProxyMethod::from_http(&method).ok_or_else(|| format!("unsupported method '{}'", s))
    }
}

impl std::fmt::Display for ProxyMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of methods a proxy instance accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSet(Vec<ProxyMethod>);

impl MethodSet {
    pub fn new(methods: impl IntoIterator<Item = ProxyMethod>) -> Self {
        let mut set = Vec::new();
        for m in methods {
            if !set.contains(&m) {
                set.push(m);
            }
        }
        Self(set)
    }

    pub fn all() -> Self {
        Self::new(ProxyMethod::ALL)
    }

    pub fn contains(&self, method: ProxyMethod) -> bool {
        self.0.contains(&method)
    }

    /// Look up an inbound method; `None` means 405.
    pub fn accept(&self, method: &Method) -> Option<ProxyMethod> {
        ProxyMethod::from_http(method).filter(|m| self.contains(*m))
    }

    /// Value for an `Allow` response header.
    pub fn allow_header(&self) -> String {
        self.0
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Default for MethodSet {
    fn default() -> Self {
        Self::all()
    }
}
