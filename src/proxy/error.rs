//! Per-request error taxonomy.
//!
//! Every variant is recoverable at the request boundary: the controller turns
//! it into a `ProxyResponse` and the process keeps serving.

use axum::http::{header, HeaderValue, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;

use crate::config::ValidationError;
use crate::proxy::recorder::RequestKey;
use crate::proxy::response::ProxyResponse;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The upstream exchange could not be completed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{method} {url}: invalid upstream request: {source}")]
    InvalidRequest {
        method: Method,
        url: String,
        #[source]
        source: axum::http::Error,
    },

    #[error("{method} {url}: transport failure: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{method} {url}: failed reading response body: {source}")]
    Body {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("{method} {url}: no response within {timeout:?}")]
    Timeout {
        method: Method,
        url: String,
        timeout: Duration,
    },
}

impl UpstreamError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::InvalidRequest { .. } => "invalid_request",
            UpstreamError::Transport { .. } => "transport",
            UpstreamError::Body { .. } => "body",
            UpstreamError::Timeout { .. } => "timeout",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            UpstreamError::InvalidRequest { url, .. }
            | UpstreamError::Transport { url, .. }
            | UpstreamError::Body { url, .. }
            | UpstreamError::Timeout { url, .. } => url,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Failures of the recorder storage.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Playback was requested for a key that was never recorded.
    #[error("no recording for {0}")]
    NotRecorded(RequestKey),

    #[error("recorder storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recorder serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("recorder {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("stored recording is invalid: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Config(#[from] ValidationError),
}

impl RecorderError {
    pub fn status(&self) -> StatusCode {
        match self {
            RecorderError::NotRecorded(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Any failure while handling one request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("method {method} is not allowed")]
    MethodNotAllowed { method: Method, allow: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(e) => e.status(),
            ProxyError::Recorder(e) => e.status(),
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }

    /// Convert into the response returned to the inbound caller.
    pub fn into_response(self) -> ProxyResponse {
        let status = self.status();
        let mut response = ProxyResponse::text(status, self.to_string());
        if let ProxyError::MethodNotAllowed { allow, .. } = &self {
            if let Ok(value) = HeaderValue::from_str(allow) {
                response.headers.insert(header::ALLOW, value);
            }
        }
        response
    }
}
