//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, mount path, body limit).
    pub listener: ListenerConfig,

    /// Upstream origin and proxy behaviour.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Storage for recorded request/response pairs.
    pub recorder: RecorderConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path prefix the proxy is mounted under ("/" mounts at the root).
    pub mount_path: String,

    /// Maximum buffered inbound body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            mount_path: "/".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Proxy operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// Plain forwarding proxy.
    #[default]
    None,
    /// Forward and record every exchange.
    Record,
    /// Serve recorded responses only; never contact the upstream.
    Play,
}

impl ProxyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyMode::None => "none",
            ProxyMode::Record => "record",
            ProxyMode::Play => "play",
        }
    }
}

impl std::fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProxyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ProxyMode::None),
            "record" => Ok(ProxyMode::Record),
            "play" => Ok(ProxyMode::Play),
            other => Err(format!("unsupported proxy mode '{}'", other)),
        }
    }
}

/// Upstream origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Absolute origin URL requests are forwarded to.
    pub base_url: String,

    /// Operating mode.
    pub mode: ProxyMode,

    /// Rewrite root-relative references in response bodies.
    pub rewrite: bool,

    /// HTTP methods the proxy accepts (others get 405).
    pub methods: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            mode: ProxyMode::None,
            rewrite: false,
            methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Full upstream exchange timeout in seconds.
    pub upstream_secs: u64,

    /// Timeout for each recorder read or write in seconds.
    pub recorder_secs: u64,

    /// Whole inbound request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            upstream_secs: 30,
            recorder_secs: 5,
            request_secs: 60,
        }
    }
}

/// Recorder storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecorderBackend {
    /// Process-local map; lost on restart.
    #[default]
    Memory,
    /// Memory map persisted to a JSON file.
    File,
}

/// Recorder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub backend: RecorderBackend,

    /// Snapshot file for the `file` backend.
    pub path: Option<String>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            backend: RecorderBackend::Memory,
            path: Some("recordings.json".to_string()),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
