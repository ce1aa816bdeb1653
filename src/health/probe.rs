//! HTTP health probe.
//!
//! # Responsibilities
//! - Issue one `GET http://<upstream-ip>:<port><path>` per call
//! - Report 2xx-within-timeout as healthy, everything else as unhealthy
//! - Never propagate errors: they are folded into [`HealthResult`]

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::header::USER_AGENT;
use hyper::{Method, Request};
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time;

const PROBE_USER_AGENT: &str = concat!("dns-health-proxy/", env!("CARGO_PKG_VERSION"));

/// Where and how often an upstream is probed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEndpoint {
    /// Host of the upstream the endpoint belongs to.
    pub host: IpAddr,
    pub port: u16,
    pub path: String,
    pub interval: Duration,
    pub timeout: Duration,
}

impl HealthEndpoint {
    /// The URL probed for this endpoint.
    pub fn url(&self) -> String {
        format!("http://{}{}", SocketAddr::new(self.host, self.port), self.path)
    }
}

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("invalid health check request: {0}")]
    InvalidRequest(String),
    #[error("connection error: {0}")]
    Transport(String),
    #[error("non-success status {0}")]
    Status(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Outcome of a single probe.
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub ok: bool,
    pub latency: Duration,
    pub error: Option<ProbeError>,
}

impl HealthResult {
    pub fn success(latency: Duration) -> Self {
        Self {
            ok: true,
            latency,
            error: None,
        }
    }

    pub fn failure(latency: Duration, error: ProbeError) -> Self {
        Self {
            ok: false,
            latency,
            error: Some(error),
        }
    }
}

/// A liveness check against a health endpoint.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn probe(&self, endpoint: &HealthEndpoint, timeout: Duration) -> HealthResult;
}

/// Probe over plain HTTP/1.
///
/// Connections are not pooled: every probe opens, uses and releases its own
/// socket.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(HttpConnector::new());

        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, endpoint: &HealthEndpoint, timeout: Duration) -> HealthResult {
        let start = Instant::now();

        let request = match Request::builder()
            .method(Method::GET)
            .uri(endpoint.url())
            .header(USER_AGENT, PROBE_USER_AGENT)
            .body(Empty::<Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                return HealthResult::failure(
                    start.elapsed(),
                    ProbeError::InvalidRequest(e.to_string()),
                )
            }
        };

        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    HealthResult::success(start.elapsed())
                } else {
                    HealthResult::failure(start.elapsed(), ProbeError::Status(status.as_u16()))
                }
            }
            Ok(Err(e)) => {
                HealthResult::failure(start.elapsed(), ProbeError::Transport(e.to_string()))
            }
            Err(_) => HealthResult::failure(start.elapsed(), ProbeError::Timeout(timeout)),
        }
    }
}
