//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate the upstream base URL (absolute, http(s), has a host)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Validate the method capability set
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::{RecorderBackend, ServerConfig};
use crate::proxy::request::ProxyMethod;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid base_url '{url}': {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("mount_path '{0}' must start with '/'")]
    MountPath(String),

    #[error("invalid bind_address '{0}'")]
    BindAddress(String),

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("max_body_bytes must be greater than zero")]
    ZeroBodyLimit,

    #[error("upstream.methods must not be empty")]
    NoMethods,

    #[error("unsupported method '{0}'")]
    UnknownMethod(String),

    #[error("file recorder requires recorder.path")]
    MissingRecorderPath,
}

/// Parse and check an upstream base URL.
pub fn validate_base_url(raw: &str) -> Result<Url, ValidationError> {
    let invalid = |reason: &str| ValidationError::BaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid("missing host")),
    }
}

/// Validate a whole configuration, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config
        .listener
        .bind_address
        .parse::<std::net::SocketAddr>()
        .is_err()
    {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if !config.listener.mount_path.starts_with('/') {
        errors.push(ValidationError::MountPath(config.listener.mount_path.clone()));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if let Err(e) = validate_base_url(&config.upstream.base_url) {
        errors.push(e);
    }
    if config.upstream.methods.is_empty() {
        errors.push(ValidationError::NoMethods);
    }
    for method in &config.upstream.methods {
        if method.parse::<ProxyMethod>().is_err() {
            errors.push(ValidationError::UnknownMethod(method.clone()));
        }
    }

    let timeouts = [
        ("connect_secs", config.timeouts.connect_secs),
        ("upstream_secs", config.timeouts.upstream_secs),
        ("recorder_secs", config.timeouts.recorder_secs),
        ("request_secs", config.timeouts.request_secs),
    ];
    for (name, value) in timeouts {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if config.recorder.backend == RecorderBackend::File && config.recorder.path.is_none() {
        errors.push(ValidationError::MissingRecorderPath);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
