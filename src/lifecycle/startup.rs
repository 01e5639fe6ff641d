//! Startup orchestration.
//!
//! # Responsibilities
//! - Build proxy instances from a validated config
//! - Initialize subsystems in dependency order
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, Overrides, ServerConfig};
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::observability::metrics::init_metrics;
use crate::proxy::{build_recorder, HyperUpstream, Proxy, ProxyConfig, Recorder, RecorderError, RecorderGateway};
use crate::resilience::Deadlines;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("config watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Build a proxy instance for `config` on top of a shared recorder.
///
/// Every instance gets its own upstream client with the configured timeouts.
pub fn build_proxy(config: &ServerConfig, recorder: Arc<dyn Recorder>) -> Result<Proxy, ConfigError> {
    let proxy_config = ProxyConfig::from_upstream(&config.upstream)?;
    let deadlines = Deadlines::from_config(&config.timeouts);
    let upstream = Arc::new(HyperUpstream::new(&deadlines));
    let gateway = RecorderGateway::new(recorder, deadlines.recorder);
    Ok(Proxy::new(proxy_config, upstream, gateway))
}

/// Run the proxy until a termination signal arrives.
///
/// With `watch` set, edits to that file reconfigure the running proxy;
/// `overrides` are re-applied to every reloaded file.
pub async fn run(
    config: ServerConfig,
    watch: Option<PathBuf>,
    overrides: Overrides,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        init_metrics(addr)?;
    }

    let recorder = build_recorder(&config.recorder)?;
    tracing::info!(backend = ?config.recorder.backend, "Recorder ready");

    let server = HttpServer::new(config.clone(), recorder)?;

    let (updates, _watcher) = match watch {
        Some(path) => {
            let (watcher, reloaded) = ConfigWatcher::new(&path);
            let handle = watcher.run()?;
            tracing::info!(path = %path.display(), "Watching config file");
            (apply_overrides(reloaded, overrides), Some(handle))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    server.run(listener, updates, shutdown_rx).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Forward reloaded configs with the command-line overrides applied.
fn apply_overrides(
    mut reloaded: mpsc::UnboundedReceiver<ServerConfig>,
    overrides: Overrides,
) -> mpsc::UnboundedReceiver<ServerConfig> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(config) = reloaded.recv().await {
            match overrides.apply(config) {
                Ok(config) => {
                    if tx.send(config).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!(error = %e, "Reloaded config rejected"),
            }
        }
    });
    rx
}
