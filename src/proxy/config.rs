//! Per-instance proxy settings.

use crate::config::{ConfigError, ProxyMode, UpstreamConfig, ValidationError};
use crate::config::validation::validate_base_url;
use crate::proxy::recorder::origin_of;
use crate::proxy::request::{MethodSet, ProxyMethod};

/// Settings a `Proxy` is built with. Immutable for the life of the instance;
/// reconfiguring means building a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Absolute origin URL without a trailing slash.
    pub base_url: String,
    /// `host:port` namespace for recordings.
    pub origin: String,
    pub mode: ProxyMode,
    pub rewrite: bool,
    pub methods: MethodSet,
}

impl ProxyConfig {
    /// Validate `base_url` and build settings accepting every known method.
    pub fn new(base_url: &str, mode: ProxyMode, rewrite: bool) -> Result<Self, ConfigError> {
        let url = validate_base_url(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            origin: origin_of(&url),
            mode,
            rewrite,
            methods: MethodSet::all(),
        })
    }

    pub fn from_upstream(upstream: &UpstreamConfig) -> Result<Self, ConfigError> {
        let mut methods = Vec::with_capacity(upstream.methods.len());
        let mut errors = Vec::new();
        for raw in &upstream.methods {
            match raw.parse::<ProxyMethod>() {
                Ok(m) => methods.push(m),
                Err(_) => errors.push(ValidationError::UnknownMethod(raw.clone())),
            }
        }
        if methods.is_empty() && errors.is_empty() {
            errors.push(ValidationError::NoMethods);
        }
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        Ok(Self::new(&upstream.base_url, upstream.mode, upstream.rewrite)?
            .with_methods(MethodSet::new(methods)))
    }

    pub fn with_methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }
}
