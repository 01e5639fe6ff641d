//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Upstream exchange:
//!     → timeouts.rs (connect deadline on the connector, exchange deadline around send)
//! Recorder read/write:
//!     → timeouts.rs (storage deadline around each call)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - An expired deadline becomes a typed error, never a hang
//! - No retries: record mode must see exactly one upstream exchange per request

pub mod timeouts;

pub use timeouts::Deadlines;
