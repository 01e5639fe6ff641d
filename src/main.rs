//! Programmable HTTP forwarding proxy with record and playback.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ──▶ proxy controller ──┬──▶ upstream client ──▶ Origin
//!                    (mount path)    (normalize, check   │         │
//!                                     method, mode)      │         ▼
//!                                                        │     recorder (record mode,
//!                                                        │      detached)
//!                                                        └──▶ recorder (play mode)
//!     Client Response                                              │
//!     ◀───────────── http response ◀── rewriter (optional) ◀──────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use playback_proxy::config::{load_config, ConfigError, Overrides, ProxyMode, ServerConfig};
use playback_proxy::lifecycle::startup;
use playback_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "playback-proxy")]
#[command(about = "HTTP forwarding proxy with record and playback", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Operating mode: none, record or play
    #[arg(short, long)]
    mode: Option<ProxyMode>,

    /// Origin the proxy forwards to
    #[arg(short, long)]
    base_url: Option<String>,

    /// Rewrite root-relative references in response bodies
    #[arg(short, long)]
    rewrite: bool,

    /// Reload the config file when it changes
    #[arg(short, long, requires = "config")]
    watch: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            mode: self.mode,
            base_url: self.base_url.clone(),
            rewrite: self.rewrite,
        }
    }

    fn load(&self) -> Result<ServerConfig, ConfigError> {
        let config = match &self.config {
            Some(path) => load_config(path)?,
            None => ServerConfig::default(),
        };
        self.overrides().apply(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    init_logging(&config.observability);
    tracing::info!("playback-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mount_path = %config.listener.mount_path,
        base_url = %config.upstream.base_url,
        mode = %config.upstream.mode,
        rewrite = config.upstream.rewrite,
        "Configuration loaded"
    );

    let watch = if cli.watch { cli.config.clone() } else { None };
    startup::run(config, watch, cli.overrides()).await?;
    Ok(())
}
