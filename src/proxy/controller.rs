//! Per-request orchestration.
//!
//! # State Machine
//! ```text
//! mode = none:   Received → Normalized → Dispatched → [Rewritten] → Done
//! mode = record: Received → Normalized → Dispatched → Recorded → [Rewritten] → Done
//! mode = play:   Received → Normalized → PlayedBack → [Rewritten] → Done
//! ```
//!
//! # Design Decisions
//! - The controller holds no per-request state; `ProxyConfig` is read-only
//! - Every request yields exactly one response; errors become responses here
//! - Recording runs in a detached task and never delays or fails the response
//! - The recorded response is the upstream's, before rewriting, so a replay
//!   goes through the rewriter exactly once

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::config::ProxyMode;
use crate::observability::metrics;
use crate::proxy::config::ProxyConfig;
use crate::proxy::error::ProxyError;
use crate::proxy::recorder::{RecorderGateway, RequestKey};
use crate::proxy::request::{normalize, InboundRequest};
use crate::proxy::response::ProxyResponse;
use crate::proxy::rewrite::{mount_prefix, rewrite};
use crate::proxy::upstream::{dispatch, OutboundRequest, Upstream};

/// Pipeline stages, in the order a request passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Normalized,
    Dispatched,
    PlayedBack,
    Recorded,
    Rewritten,
    Done,
}

/// Outcome of one proxied request.
#[derive(Debug)]
pub struct Exchange {
    pub response: ProxyResponse,
    /// Stages the request went through.
    pub stages: Vec<Stage>,
    /// The background recording task, in record mode.
    pub recording: Option<JoinHandle<()>>,
}

/// A configured proxy instance.
#[derive(Clone)]
pub struct Proxy {
    config: Arc<ProxyConfig>,
    upstream: Arc<dyn Upstream>,
    recorder: RecorderGateway,
}

impl Proxy {
    pub fn new(config: ProxyConfig, upstream: Arc<dyn Upstream>, recorder: RecorderGateway) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
            recorder,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn recorder(&self) -> &RecorderGateway {
        &self.recorder
    }

    /// Proxy `request` to `target_path` and return the response.
    pub async fn handle(&self, request: InboundRequest, target_path: &str) -> ProxyResponse {
        self.handle_exchange(request, target_path).await.response
    }

    /// Like `handle`, also reporting the stages taken and any recording task.
    pub async fn handle_exchange(&self, request: InboundRequest, target_path: &str) -> Exchange {
        let start = Instant::now();
        let method = request.method.clone();
        let mut stages = Vec::with_capacity(6);
        let mut recording = None;

        let result = self.run(request, target_path, &mut stages, &mut recording).await;
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, status = e.status().as_u16(), "Proxy request failed");
                e.into_response()
            }
        };
        advance(&mut stages, Stage::Done);

        metrics::record_request(
            method.as_str(),
            response.status.as_u16(),
            self.config.mode.as_str(),
            start,
        );
        Exchange {
            response,
            stages,
            recording,
        }
    }

    async fn run(
        &self,
        request: InboundRequest,
        target_path: &str,
        stages: &mut Vec<Stage>,
        recording: &mut Option<JoinHandle<()>>,
    ) -> Result<ProxyResponse, ProxyError> {
        advance(stages, Stage::Received);
        let request = normalize(request, target_path);
        advance(stages, Stage::Normalized);

        let method = self.config.methods.accept(&request.method).ok_or_else(|| {
            ProxyError::MethodNotAllowed {
                method: request.method.clone(),
                allow: self.config.methods.allow_header(),
            }
        })?;
        let key = RequestKey::for_request(&self.config.origin, &request);

        let mut response = match self.config.mode {
            ProxyMode::Play => {
                let response = self.recorder.playback(&key).await?;
                advance(stages, Stage::PlayedBack);
                response
            }
            ProxyMode::None | ProxyMode::Record => {
                let mut outbound =
                    OutboundRequest::from_inbound(&request, method, &self.config.base_url);
                if self.config.rewrite {
                    outbound = outbound.with_identity_encoding();
                }
                let response = dispatch(self.upstream.as_ref(), outbound).await?;
                advance(stages, Stage::Dispatched);

                if self.config.mode == ProxyMode::Record {
                    *recording = Some(self.spawn_record(key, response.clone()));
                    advance(stages, Stage::Recorded);
                }
                response
            }
        };

        if self.config.rewrite {
            rewrite(&mut response, mount_prefix(&request.original_path, &request.path));
            advance(stages, Stage::Rewritten);
        }

        Ok(response)
    }

    fn spawn_record(&self, key: RequestKey, response: ProxyResponse) -> JoinHandle<()> {
        let recorder = self.recorder.clone();
        tokio::spawn(async move {
            match recorder.record(&key, &response).await {
                Ok(()) => tracing::debug!(key = %key, "Recorded exchange"),
                Err(e) => tracing::warn!(key = %key, error = %e, "Failed to record exchange"),
            }
        })
    }
}

fn advance(stages: &mut Vec<Stage>, stage: Stage) {
    tracing::trace!(stage = ?stage, "Pipeline stage");
    stages.push(stage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::error::{RecorderError, UpstreamError};
    use crate::proxy::recorder::{MemoryRecorder, Recorder};
    use crate::proxy::request::{MethodSet, ProxyMethod};
    use crate::proxy::url::QueryString;
    use async_trait::async_trait;
    use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Upstream fake that records every request it receives.
    struct FakeUpstream {
        status: StatusCode,
        body: &'static str,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeUpstream {
        fn new(status: StatusCode, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<OutboundRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn send(&self, request: OutboundRequest) -> Result<ProxyResponse, UpstreamError> {
            self.seen.lock().unwrap().push(request);
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
            Ok(ProxyResponse::new(self.status, headers, self.body))
        }
    }

    struct DownUpstream;

    #[async_trait]
    impl Upstream for DownUpstream {
        async fn send(&self, request: OutboundRequest) -> Result<ProxyResponse, UpstreamError> {
            Err(UpstreamError::Transport {
                method: request.method,
                url: request.url,
                source: "connection refused".into(),
            })
        }
    }

    struct BrokenRecorder;

    #[async_trait]
    impl Recorder for BrokenRecorder {
        async fn record(&self, _: &RequestKey, _: &ProxyResponse) -> Result<(), RecorderError> {
            Err(RecorderError::Io(std::io::Error::other("disk full")))
        }

        async fn playback(&self, key: &RequestKey) -> Result<ProxyResponse, RecorderError> {
            Err(RecorderError::NotRecorded(key.clone()))
        }

        fn len(&self) -> usize {
            0
        }

        async fn clear(&self) -> Result<(), RecorderError> {
            Ok(())
        }
    }

    fn gateway(recorder: Arc<dyn Recorder>) -> RecorderGateway {
        RecorderGateway::new(recorder, Duration::from_secs(1))
    }

    fn proxy(mode: ProxyMode, rewrite: bool, upstream: Arc<dyn Upstream>, recorder: Arc<dyn Recorder>) -> Proxy {
        let config = ProxyConfig::new("http://origin.test", mode, rewrite).unwrap();
        Proxy::new(config, upstream, gateway(recorder))
    }

    #[tokio::test]
    async fn test_forward_mode_passes_response_through() {
        let upstream = FakeUpstream::new(StatusCode::OK, "<img src=\"/a.png\">");
        let proxy = proxy(ProxyMode::None, false, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let exchange = proxy
            .handle_exchange(InboundRequest::new(Method::GET, "/index.html"), "index.html")
            .await;

        let calls = upstream.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://origin.test/index.html");
        assert_eq!(calls[0].method, Method::GET);
        assert_eq!(exchange.response.status, StatusCode::OK);
        assert_eq!(exchange.response.body, Bytes::from_static(b"<img src=\"/a.png\">"));
        assert_eq!(exchange.response.content_type(), Some("text/html"));
        assert_eq!(
            exchange.stages,
            vec![Stage::Received, Stage::Normalized, Stage::Dispatched, Stage::Done]
        );
        assert!(exchange.recording.is_none());
    }

    #[tokio::test]
    async fn test_query_is_forwarded() {
        let upstream = FakeUpstream::new(StatusCode::OK, "");
        let proxy = proxy(ProxyMode::None, false, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let request = InboundRequest::new(Method::GET, "/proxy/search")
            .with_query(QueryString::from_raw(Some("q=rust%20lang&page=2")));
        proxy.handle(request, "search").await;

        assert_eq!(upstream.calls()[0].url, "http://origin.test/search?q=rust%20lang&page=2");
    }

    #[tokio::test]
    async fn test_record_then_play() {
        let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
        let upstream = FakeUpstream::new(StatusCode::OK, "hello");

        let recording = proxy(ProxyMode::Record, false, upstream.clone(), recorder.clone());
        let exchange = recording
            .handle_exchange(InboundRequest::new(Method::GET, "/a"), "/a")
            .await;
        assert_eq!(
            exchange.stages,
            vec![Stage::Received, Stage::Normalized, Stage::Dispatched, Stage::Recorded, Stage::Done]
        );
        exchange.recording.unwrap().await.unwrap();
        assert_eq!(recorder.len(), 1);

        let playing = proxy(ProxyMode::Play, false, upstream.clone(), recorder.clone());
        let exchange = playing
            .handle_exchange(InboundRequest::new(Method::GET, "/a"), "/a")
            .await;

        assert_eq!(exchange.response.status, StatusCode::OK);
        assert_eq!(exchange.response.body, Bytes::from_static(b"hello"));
        assert_eq!(
            exchange.stages,
            vec![Stage::Received, Stage::Normalized, Stage::PlayedBack, Stage::Done]
        );
        assert_eq!(upstream.calls().len(), 1, "playback must not contact the upstream");
    }

    #[tokio::test]
    async fn test_play_miss_is_not_found() {
        let upstream = FakeUpstream::new(StatusCode::OK, "never");
        let proxy = proxy(ProxyMode::Play, false, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let response = proxy
            .handle(InboundRequest::new(Method::GET, "/missing"), "missing")
            .await;

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let proxy = proxy(ProxyMode::Record, true, Arc::new(DownUpstream), Arc::new(MemoryRecorder::new()));

        let exchange = proxy
            .handle_exchange(InboundRequest::new(Method::GET, "/proxy/a"), "a")
            .await;

        assert_eq!(exchange.response.status, StatusCode::BAD_GATEWAY);
        let body = String::from_utf8_lossy(&exchange.response.body).to_string();
        assert!(body.contains("http://origin.test/a"));
        assert!(exchange.recording.is_none());
        assert_eq!(exchange.stages.last(), Some(&Stage::Done));
        assert!(!exchange.stages.contains(&Stage::Rewritten));
    }

    #[tokio::test]
    async fn test_record_failure_does_not_block_response() {
        let upstream = FakeUpstream::new(StatusCode::OK, "fine");
        let proxy = proxy(ProxyMode::Record, false, upstream, Arc::new(BrokenRecorder));

        let exchange = proxy
            .handle_exchange(InboundRequest::new(Method::GET, "/a"), "a")
            .await;
        assert_eq!(exchange.response.status, StatusCode::OK);
        assert_eq!(exchange.response.body, Bytes::from_static(b"fine"));
        exchange.recording.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn test_rewrite_runs_once_on_dispatch() {
        let upstream = FakeUpstream::new(StatusCode::OK, r#"<img src="/a.png"><a href="//cdn.test/x">"#);
        let proxy = proxy(ProxyMode::None, true, upstream, Arc::new(MemoryRecorder::new()));

        let exchange = proxy
            .handle_exchange(InboundRequest::new(Method::GET, "/proxy/page"), "page")
            .await;

        assert_eq!(
            exchange.response.body,
            Bytes::from_static(br#"<img src="/proxy/a.png"><a href="//cdn.test/x">"#)
        );
        let rewrites = exchange.stages.iter().filter(|s| **s == Stage::Rewritten).count();
        assert_eq!(rewrites, 1);
    }

    #[tokio::test]
    async fn test_rewrite_runs_once_on_replay() {
        let recorder: Arc<dyn Recorder> = Arc::new(MemoryRecorder::new());
        let upstream = FakeUpstream::new(StatusCode::OK, r#"<img src="/a.png">"#);

        let recording = proxy(ProxyMode::Record, true, upstream.clone(), recorder.clone());
        let exchange = recording
            .handle_exchange(InboundRequest::new(Method::GET, "/proxy/page"), "page")
            .await;
        assert_eq!(exchange.response.body, Bytes::from_static(br#"<img src="/proxy/a.png">"#));
        exchange.recording.unwrap().await.unwrap();

        let playing = proxy(ProxyMode::Play, true, upstream, recorder);
        let exchange = playing
            .handle_exchange(InboundRequest::new(Method::GET, "/proxy/page"), "page")
            .await;
        assert_eq!(exchange.response.body, Bytes::from_static(br#"<img src="/proxy/a.png">"#));
        assert_eq!(
            exchange.stages,
            vec![Stage::Received, Stage::Normalized, Stage::PlayedBack, Stage::Rewritten, Stage::Done]
        );
    }

    #[tokio::test]
    async fn test_rewrite_requests_identity_encoding() {
        let upstream = FakeUpstream::new(StatusCode::OK, "");
        let proxy = proxy(ProxyMode::None, true, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let request = InboundRequest::new(Method::GET, "/proxy/page")
            .with_header(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        proxy.handle(request, "page").await;

        assert_eq!(upstream.calls()[0].headers[header::ACCEPT_ENCODING], "identity");
    }

    #[tokio::test]
    async fn test_accept_encoding_kept_without_rewrite() {
        let upstream = FakeUpstream::new(StatusCode::OK, "");
        let proxy = proxy(ProxyMode::None, false, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let request = InboundRequest::new(Method::GET, "/page")
            .with_header(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));
        proxy.handle(request, "page").await;

        assert_eq!(upstream.calls()[0].headers[header::ACCEPT_ENCODING], "gzip, br");
    }

    #[tokio::test]
    async fn test_post_forwards_body_and_content_type() {
        let upstream = FakeUpstream::new(StatusCode::CREATED, "");
        let proxy = proxy(ProxyMode::None, false, upstream.clone(), Arc::new(MemoryRecorder::new()));

        let request = InboundRequest::new(Method::POST, "/api/items")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(r#"{"name":"x"}"#);
        let response = proxy.handle(request, "api/items").await;

        assert_eq!(response.status, StatusCode::CREATED);
        let call = &upstream.calls()[0];
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.body, Bytes::from_static(br#"{"name":"x"}"#));
        assert_eq!(call.headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test]
    async fn test_method_outside_capability_set() {
        let upstream = FakeUpstream::new(StatusCode::OK, "");
        let config = ProxyConfig::new("http://origin.test", ProxyMode::None, false)
            .unwrap()
            .with_methods(MethodSet::new([ProxyMethod::Get, ProxyMethod::Post]));
        let proxy = Proxy::new(config, upstream.clone(), gateway(Arc::new(MemoryRecorder::new())));

        let response = proxy.handle(InboundRequest::new(Method::DELETE, "/a"), "a").await;

        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers[header::ALLOW], "GET, POST");
        assert!(upstream.calls().is_empty());
    }
}
