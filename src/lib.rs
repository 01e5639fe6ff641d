//! Programmable HTTP forwarding proxy with record/playback and root-relative
//! reference rewriting.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod proxy;
pub mod resilience;

pub use config::{ProxyMode, ServerConfig};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{Proxy, ProxyConfig};
