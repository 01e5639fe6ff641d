//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → proxy::ProxyConfig built once per proxy instance
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → a new proxy instance is built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a new proxy instance
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError, Overrides};
pub use schema::{
    ListenerConfig, LogFormat, ObservabilityConfig, ProxyMode, RecorderBackend, RecorderConfig,
    ServerConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::ValidationError;
