//! Post-start health check of the deployed workload.
//!
//! Performs HTTP GET probes against the instance with exponential backoff
//! between failures until a 2xx arrives or the deadline passes.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use cloudburst_core::Backoff;
use cloudburst_core::config::HealthCheckConfig;

use crate::error::DeployError;
use crate::readiness::{BoxFuture, deadline_after};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(15);

/// Result of a single health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint answered with a non-2xx status.
    Unhealthy,
    /// The probe could not be executed (connect error or timeout).
    Failed,
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeResult::Healthy => "healthy",
            ProbeResult::Unhealthy => "unhealthy",
            ProbeResult::Failed => "failed",
        })
    }
}

/// Verifies the workload answers after it was started.
pub trait HealthCheck: Send + Sync {
    fn check<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<(), DeployError>>;
}

#[derive(Debug, Clone)]
pub struct HttpHealthCheck {
    pub port: u16,
    pub path: String,
    pub timeout: Duration,
    pub probe_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl From<&HealthCheckConfig> for HttpHealthCheck {
    fn from(config: &HealthCheckConfig) -> Self {
        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };
        Self {
            port: config.port,
            path,
            timeout: config.timeout(),
            probe_timeout: config.probe_timeout(),
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl HealthCheck for HttpHealthCheck {
    fn check<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<(), DeployError>> {
        Box::pin(async move {
            let authority = authority(address, self.port);
            let started = Instant::now();
            let deadline = deadline_after(started, self.timeout);
            let mut backoff = Backoff::new(self.initial_backoff, self.max_backoff);

            loop {
                let result = http_probe(address, self.port, &self.path, self.probe_timeout).await;
                if result == ProbeResult::Healthy {
                    info!(
                        %authority,
                        path = %self.path,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "workload healthy"
                    );
                    return Ok(());
                }

                let now = Instant::now();
                if now >= deadline {
                    warn!(%authority, path = %self.path, last = %result, "health check deadline passed");
                    return Err(DeployError::HealthCheckFailed {
                        url: format!("http://{authority}{}", self.path),
                        waited: self.timeout,
                        last: result.to_string(),
                    });
                }
                tokio::time::sleep(backoff.next_delay().min(deadline - now)).await;
            }
        })
    }
}

/// `host:port`, with IPv6 literals in brackets.
pub fn authority(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Perform one HTTP GET against `http://{host}:{port}{path}`.
///
/// Returns `Healthy` if the response is 2xx, `Unhealthy` for non-2xx,
/// or `Failed` if the connection fails or times out.
pub async fn http_probe(host: &str, port: u16, path: &str, timeout: Duration) -> ProbeResult {
    let authority = authority(host, port);
    let uri = format!("http://{authority}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect((host, port)).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %uri, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %uri, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", authority.as_str())
            .header("user-agent", concat!("cloudburst/", env!("CARGO_PKG_VERSION")))
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %uri, "health probe request invalid");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(resp) => {
                debug!(status = %resp.status(), %uri, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Err(e) => {
                debug!(error = %e, %uri, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    result.unwrap_or_else(|_| {
        debug!(%uri, "health probe timed out");
        ProbeResult::Failed
    })
}
