//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router mounted at the configured path
//! - Wire up middleware (request ID, tracing, request timeout)
//! - Bind server to listener
//! - Hand each request to the current proxy instance
//! - Swap in a freshly built proxy instance on config reload

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{ConfigError, ServerConfig};
use crate::http::request::{into_inbound, target_path};
use crate::lifecycle::startup::build_proxy;
use crate::observability::tracing::request_span;
use crate::proxy::{Proxy, Recorder};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// The proxy instance new requests are handed to.
    pub proxy: Arc<ArcSwap<Proxy>>,
    /// Mount path without a trailing slash; empty when mounted at `/`.
    pub mount: String,
    pub max_body_bytes: usize,
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    proxy: Arc<ArcSwap<Proxy>>,
    recorder: Arc<dyn Recorder>,
}

impl HttpServer {
    /// Build the server and its first proxy instance.
    ///
    /// Fails when the upstream configuration is invalid, before any request
    /// can be accepted.
    pub fn new(config: ServerConfig, recorder: Arc<dyn Recorder>) -> Result<Self, ConfigError> {
        let proxy = Arc::new(ArcSwap::from_pointee(build_proxy(&config, recorder.clone())?));

        let state = AppState {
            proxy: proxy.clone(),
            mount: config.listener.mount_path.trim_end_matches('/').to_string(),
            max_body_bytes: config.listener.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            proxy,
            recorder,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        let mount = config.listener.mount_path.trim_end_matches('/');

        Router::new()
            .route(&format!("{}/{{*path}}", mount), any(proxy_handler))
            .route(&format!("{}/", mount), any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The proxy instance currently serving requests.
    pub fn proxy(&self) -> Arc<Proxy> {
        self.proxy.load_full()
    }

    /// Get a reference to the config the server was started with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires.
    ///
    /// Each config received on `config_updates` becomes a new proxy instance.
    /// Requests already running keep the instance they started on.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mount_path = %self.config.listener.mount_path,
            mode = %self.config.upstream.mode,
            base_url = %self.config.upstream.base_url,
            "HTTP server starting"
        );

        let swap = self.proxy.clone();
        let recorder = self.recorder.clone();
        let listener_config = self.config.listener.clone();
        tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                if new_config.listener.bind_address != listener_config.bind_address
                    || new_config.listener.mount_path != listener_config.mount_path
                {
                    tracing::warn!("Listener settings changed; they take effect after a restart");
                }
                match build_proxy(&new_config, recorder.clone()) {
                    Ok(proxy) => {
                        swap.store(Arc::new(proxy));
                        tracing::info!(
                            mode = %new_config.upstream.mode,
                            base_url = %new_config.upstream.base_url,
                            "Proxy reconfigured"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Rejected new configuration, keeping current proxy");
                    }
                }
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Everything at or below the mount path.
///
/// The target path is cut from the raw request path so percent-encoding
/// reaches the upstream untouched.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let target = target_path(request.uri().path(), &state.mount).to_string();

    let inbound = match into_inbound(request, state.max_body_bytes).await {
        Ok(inbound) => inbound,
        Err(rejection) => return rejection.into_response(),
    };

    let proxy = state.proxy.load_full();
    proxy.handle(inbound, &target).await.into_response()
}
