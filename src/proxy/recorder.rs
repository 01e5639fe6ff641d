//! Recording and playback of upstream exchanges.
//!
//! # Responsibilities
//! - Key recordings by (origin, method, normalized path, query)
//! - Store responses with round-trip fidelity (status, every header value, body bytes)
//! - Signal `NotRecorded` on a playback miss, never a default response
//! - Bound every storage call with a deadline
//!
//! # Design Decisions
//! - Keys ignore headers and body so replays match despite incidental variation
//! - Last write wins; concurrent records of one key are not deduplicated
//! - Recordings are namespaced by upstream origin (`host:port`)

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

use crate::config::{RecorderBackend, RecorderConfig, ValidationError};
use crate::observability::metrics;
use crate::proxy::error::RecorderError;
use crate::proxy::request::InboundRequest;
use crate::proxy::response::ProxyResponse;
use crate::proxy::url::QueryString;
use crate::resilience::timeouts::within;

/// Identity of a recorded exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// `host:port` of the upstream the exchange was recorded against.
    pub origin: String,
    pub method: String,
    pub path: String,
    pub query: QueryString,
}

impl RequestKey {
    pub fn new(origin: &str, method: &Method, path: &str, query: &QueryString) -> Self {
        Self {
            origin: origin.to_string(),
            method: method.as_str().to_uppercase(),
            path: path.to_string(),
            query: query.clone(),
        }
    }

    /// Key for a normalized inbound request.
    pub fn for_request(origin: &str, request: &InboundRequest) -> Self {
        Self::new(origin, &request.method, &request.path, &request.query)
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}{}", self.method, self.origin, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

/// The recording namespace of an upstream: host plus explicit or default port.
pub fn origin_of(base_url: &Url) -> String {
    let host = base_url.host_str().unwrap_or_default();
    match base_url.port_or_known_default() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Serialized form of a recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    /// Header values as raw bytes; repeated headers appear once per value.
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
    /// Unix timestamp in seconds
    pub recorded_at_secs: u64,
}

impl StoredResponse {
    pub fn capture(response: &ProxyResponse) -> Self {
        Self {
            status: response.status.as_u16(),
            headers: response
                .headers
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.as_bytes().to_vec()))
                .collect(),
            body: response.body.to_vec(),
            recorded_at_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn to_response(&self) -> Result<ProxyResponse, RecorderError> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|_| RecorderError::Corrupt(format!("status {}", self.status)))?;

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RecorderError::Corrupt(format!("header name '{}'", name)))?;
            let value = HeaderValue::from_bytes(value)
                .map_err(|_| RecorderError::Corrupt(format!("value of header '{}'", name)))?;
            headers.append(name, value);
        }

        Ok(ProxyResponse::new(status, headers, self.body.clone()))
    }
}

/// Storage for recorded exchanges.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Store `response` under `key`, replacing any earlier recording.
    async fn record(&self, key: &RequestKey, response: &ProxyResponse) -> Result<(), RecorderError>;

    /// Fetch the response recorded under `key`.
    async fn playback(&self, key: &RequestKey) -> Result<ProxyResponse, RecorderError>;

    /// Number of recorded keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn clear(&self) -> Result<(), RecorderError>;
}

/// Process-local recorder.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    inner: Arc<DashMap<RequestKey, StoredResponse>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, key: RequestKey, stored: StoredResponse) {
        self.inner.insert(key, stored);
    }

    fn snapshot(&self) -> Vec<(RequestKey, StoredResponse)> {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}

#[async_trait]
impl Recorder for MemoryRecorder {
    async fn record(&self, key: &RequestKey, response: &ProxyResponse) -> Result<(), RecorderError> {
        self.insert(key.clone(), StoredResponse::capture(response));
        Ok(())
    }

    async fn playback(&self, key: &RequestKey) -> Result<ProxyResponse, RecorderError> {
        let stored = self
            .inner
            .get(key)
            .map(|r| r.value().clone())
            .ok_or_else(|| RecorderError::NotRecorded(key.clone()))?;
        stored.to_response()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    async fn clear(&self) -> Result<(), RecorderError> {
        self.inner.clear();
        Ok(())
    }
}

/// Recorder persisted to a JSON snapshot file.
///
/// Every `record` rewrites the whole snapshot; writes are serialized so the
/// file always reflects the latest in-memory state.
pub struct FileRecorder {
    memory: MemoryRecorder,
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRecorder {
    /// Open a snapshot, loading existing recordings when the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref().to_path_buf();
        let memory = MemoryRecorder::new();

        if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            let pairs: Vec<(RequestKey, StoredResponse)> = serde_json::from_str(&json)?;
            for (key, stored) in pairs {
                memory.insert(key, stored);
            }
            tracing::info!(path = ?path, recordings = memory.len(), "Loaded recordings");
        } else {
            tracing::debug!(path = ?path, "Recording file does not exist, starting fresh");
        }

        Ok(Self {
            memory,
            path,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), RecorderError> {
        let _guard = self.write_lock.lock().await;
        let json = serde_json::to_vec_pretty(&self.memory.snapshot())?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Recorder for FileRecorder {
    async fn record(&self, key: &RequestKey, response: &ProxyResponse) -> Result<(), RecorderError> {
        self.memory.record(key, response).await?;
        self.persist().await
    }

    async fn playback(&self, key: &RequestKey) -> Result<ProxyResponse, RecorderError> {
        self.memory.playback(key).await
    }

    fn len(&self) -> usize {
        self.memory.len()
    }

    async fn clear(&self) -> Result<(), RecorderError> {
        self.memory.clear().await?;
        self.persist().await
    }
}

/// Build the configured recorder backend.
pub fn build_recorder(config: &RecorderConfig) -> Result<Arc<dyn Recorder>, RecorderError> {
    match config.backend {
        RecorderBackend::Memory => Ok(Arc::new(MemoryRecorder::new())),
        RecorderBackend::File => {
            let path = config
                .path
                .as_deref()
                .ok_or(ValidationError::MissingRecorderPath)?;
            Ok(Arc::new(FileRecorder::open(path)?))
        }
    }
}

/// Deadline-bounded access to a `Recorder`.
#[derive(Clone)]
pub struct RecorderGateway {
    recorder: Arc<dyn Recorder>,
    timeout: Duration,
}

impl RecorderGateway {
    pub fn new(recorder: Arc<dyn Recorder>, timeout: Duration) -> Self {
        Self { recorder, timeout }
    }

    pub async fn record(&self, key: &RequestKey, response: &ProxyResponse) -> Result<(), RecorderError> {
        let result = match within(self.timeout, self.recorder.record(key, response)).await {
            Ok(result) => result,
            Err(_) => Err(RecorderError::Timeout {
                operation: "record",
                timeout: self.timeout,
            }),
        };
        metrics::record_recording(result.is_ok());
        result
    }

    pub async fn playback(&self, key: &RequestKey) -> Result<ProxyResponse, RecorderError> {
        let result = match within(self.timeout, self.recorder.playback(key)).await {
            Ok(result) => result,
            Err(_) => Err(RecorderError::Timeout {
                operation: "playback",
                timeout: self.timeout,
            }),
        };
        match &result {
            Ok(_) => metrics::record_playback(true),
            Err(RecorderError::NotRecorded(_)) => {
                tracing::info!(key = %key, "No recording for request");
                metrics::record_playback(false);
            }
            Err(e) => tracing::error!(key = %key, error = %e, "Playback failed"),
        }
        result
    }

    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }
}
