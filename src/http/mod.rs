//! Inbound HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum router mounted at listener.mount_path)
//!     → request.rs (request ID, buffer body, extract raw target path)
//!     → proxy::Proxy::handle (current instance, hot-swappable)
//!     → response.rs (ProxyResponse → HTTP response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
