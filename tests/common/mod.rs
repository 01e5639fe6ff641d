//! Shared utilities for integration testing.

use axum::http::StatusCode;
use playback_proxy::config::{ProxyMode, ServerConfig};
use playback_proxy::http::HttpServer;
use playback_proxy::lifecycle::Shutdown;
use playback_proxy::proxy::Recorder;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    /// Request target, path plus query.
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What the mock backend answers with.
pub struct MockReply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockReply {
    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }
}

/// Start a programmable mock backend on an ephemeral port.
///
/// Every request is captured before the reply is produced.
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

#[allow(dead_code)]
impl MockBackend {
    pub async fn start<F>(reply: F) -> Self
    where
        F: Fn(&CapturedRequest) -> MockReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let reply = Arc::new(reply);

        let seen = requests.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _)) => {
                        let reply = reply.clone();
                        let seen = seen.clone();
                        tokio::spawn(async move {
                            serve_one(socket, reply.as_ref(), seen).await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self { addr, requests }
    }

    /// Backend answering every request with the same text.
    pub async fn fixed(status: u16, content_type: &'static str, body: &'static str) -> Self {
        Self::start(move |_| MockReply::new(status, content_type, body)).await
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_one<F>(mut socket: TcpStream, reply: &F, seen: Arc<Mutex<Vec<CapturedRequest>>>)
where
    F: Fn(&CapturedRequest) -> MockReply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    let MockReply {
        status,
        content_type,
        body,
    } = reply(&request);
    seen.lock().unwrap().push(request);

    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        content_type,
        body.len()
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(body.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(CapturedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Config for a proxy on an ephemeral port forwarding to `base_url`.
#[allow(dead_code)]
pub fn proxy_config(base_url: &str, mode: ProxyMode, mount_path: &str, rewrite: bool) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.listener.mount_path = mount_path.into();
    config.upstream.base_url = base_url.into();
    config.upstream.mode = mode;
    config.upstream.rewrite = rewrite;
    config.timeouts.upstream_secs = 5;
    config
}

/// A running proxy server. Dropping it does not stop the server; call
/// `shutdown.trigger()`.
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<ServerConfig>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

#[allow(dead_code)]
pub async fn start_proxy(config: ServerConfig, recorder: Arc<dyn Recorder>) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, recorder).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (updates, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    RunningProxy {
        addr,
        shutdown,
        updates,
    }
}

/// Client that bypasses any system proxy and keeps no idle connections.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Poll `check` until it holds or two seconds pass.
#[allow(dead_code)]
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
