//! Timeout enforcement.
//!
//! # Responsibilities
//! - Hold the per-call deadlines derived from configuration
//! - Wrap upstream and recorder calls with Tokio's timeout
//!
//! # Design Decisions
//! - Timeout errors are distinct from other errors
//! - Timed-out upstream calls return 504 Gateway Timeout
//! - Dropping the wrapped future cancels the underlying call

use std::future::Future;
use std::time::Duration;
use tokio::time::error::Elapsed;

use crate::config::TimeoutConfig;

/// Deadlines applied to outbound work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// TCP connect to the upstream.
    pub connect: Duration,
    /// Full upstream exchange, including reading the body.
    pub upstream: Duration,
    /// Each recorder read or write.
    pub recorder: Duration,
}

impl Deadlines {
    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            connect: Duration::from_secs(config.connect_secs),
            upstream: Duration::from_secs(config.upstream_secs),
            recorder: Duration::from_secs(config.recorder_secs),
        }
    }
}

impl Default for Deadlines {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

/// Run `fut`, giving up after `limit`.
pub async fn within<F, T>(limit: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadlines_from_config() {
        let config = TimeoutConfig {
            connect_secs: 1,
            upstream_secs: 2,
            recorder_secs: 3,
            request_secs: 4,
        };
        let deadlines = Deadlines::from_config(&config);
        assert_eq!(deadlines.connect, Duration::from_secs(1));
        assert_eq!(deadlines.upstream, Duration::from_secs(2));
        assert_eq!(deadlines.recorder, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_within_expires() {
        let result = within(Duration::from_millis(10), tokio::time::sleep(Duration::from_secs(5))).await;
        assert!(result.is_err());

        let result = within(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
