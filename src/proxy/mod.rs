//! Proxy request pipeline.
//!
//! # Data Flow
//! ```text
//! InboundRequest + target path
//!     → request.rs (normalize path, check method capability)
//!     → mode = play:        recorder.rs (playback by request key)
//!       mode = none/record: url.rs (compose upstream URL)
//!                           → upstream.rs (dispatch, buffer reply)
//!                           → recorder.rs (record, detached; record mode only)
//!     → rewrite.rs (fix root-relative references, when enabled)
//!     → ProxyResponse
//! ```
//!
//! `controller.rs` drives the flow and turns every `error.rs` failure into a
//! response at its boundary.

pub mod config;
pub mod controller;
pub mod error;
pub mod headers;
pub mod recorder;
pub mod request;
pub mod response;
pub mod rewrite;
pub mod upstream;
pub mod url;

pub use config::ProxyConfig;
pub use controller::{Exchange, Proxy, Stage};
pub use error::{ProxyError, RecorderError, UpstreamError};
pub use recorder::{
    build_recorder, FileRecorder, MemoryRecorder, Recorder, RecorderGateway, RequestKey,
};
pub use request::{normalize, InboundRequest, MethodSet, ProxyMethod};
pub use response::ProxyResponse;
pub use upstream::{HyperUpstream, OutboundRequest, Upstream};
pub use url::{compose, QueryString};
