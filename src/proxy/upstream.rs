//! Upstream dispatch.
//!
//! # Responsibilities
//! - Build the outbound request from the normalized inbound request
//! - Send it through the transport with a deadline
//! - Buffer the reply into a `ProxyResponse` (status, headers, exact body bytes)
//!
//! # Design Decisions
//! - The transport sits behind the `Upstream` trait so the controller can be
//!   driven by in-process fakes
//! - Transport failures are returned as `UpstreamError`, never swallowed
//! - Dropping the `send` future drops the hyper request, closing the
//!   upstream connection when the inbound client goes away

use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use crate::observability::metrics;
use crate::proxy::error::UpstreamError;
use crate::proxy::headers;
use crate::proxy::request::{InboundRequest, ProxyMethod};
use crate::proxy::response::ProxyResponse;
use crate::proxy::url::compose;
use crate::resilience::timeouts::within;
use crate::resilience::Deadlines;

/// A request ready to be sent upstream. Never mutated once built.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundRequest {
    /// Derive the upstream request from a normalized inbound request.
    pub fn from_inbound(request: &InboundRequest, method: ProxyMethod, base_url: &str) -> Self {
        let body = if method.forwards_body(&request.body) {
            request.body.clone()
        } else {
            Bytes::new()
        };
        Self {
            method: method.as_http(),
            url: compose(base_url, &request.path, &request.query),
            headers: headers::forwardable_request_headers(&request.headers),
            body,
        }
    }

    /// Ask the upstream for an unencoded body, so it can be rewritten.
    pub fn with_identity_encoding(mut self) -> Self {
        self.headers
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        self
    }
}

/// The outbound HTTP transport.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<ProxyResponse, UpstreamError>;
}

/// Send a request upstream with dispatch/receipt logging.
pub async fn dispatch(
    upstream: &dyn Upstream,
    request: OutboundRequest,
) -> Result<ProxyResponse, UpstreamError> {
    tracing::info!(method = %request.method, url = %request.url, "Dispatching upstream request");

    match upstream.send(request).await {
        Ok(response) => {
            tracing::debug!(
                status = response.status.as_u16(),
                body = %String::from_utf8_lossy(&response.body),
                "Upstream response received"
            );
            Ok(response)
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Upstream error");
            metrics::record_upstream_error(e.kind());
            Err(e)
        }
    }
}

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// `Upstream` backed by a pooled hyper client (HTTP and HTTPS).
#[derive(Clone)]
pub struct HyperUpstream {
    client: HttpClient,
    timeout: Duration,
}

impl HyperUpstream {
    pub fn new(deadlines: &Deadlines) -> Self {
        let mut http = HttpConnector::new();
        http.set_connect_timeout(Some(deadlines.connect));
        http.enforce_http(false);

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            timeout: deadlines.upstream,
        }
    }
}

#[async_trait]
impl Upstream for HyperUpstream {
    async fn send(&self, request: OutboundRequest) -> Result<ProxyResponse, UpstreamError> {
        let method = request.method.clone();
        let url = request.url.clone();

        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let outbound = builder
            .body(Full::new(request.body))
            .map_err(|source| UpstreamError::InvalidRequest {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;

        let exchange = async {
            let response: hyper::Response<hyper::body::Incoming> =
                self.client.request(outbound).await.map_err(|e| {
                    UpstreamError::Transport {
                        method: method.clone(),
                        url: url.clone(),
                        source: Box::new(e),
                    }
                })?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| UpstreamError::Body {
                    method: method.clone(),
                    url: url.clone(),
                    source: Box::new(e),
                })?
                .to_bytes();

            Ok(ProxyResponse::new(
                parts.status,
                headers::forwardable_response_headers(&parts.headers),
                body,
            ))
        };

        match within(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout {
                method: method.clone(),
                url: url.clone(),
                timeout: self.timeout,
            }),
        }
    }
}
