//! Waiting for a fresh instance to accept remote logins.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info};

use cloudburst_core::Backoff;
use cloudburst_core::config::{ReadinessConfig, ReadinessProbeKind};

use crate::error::DeployError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stand-in for "no deadline" when `started + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `started + timeout`, saturating instead of panicking on overflow.
pub(crate) fn deadline_after(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout)
        .or_else(|| started.checked_add(FAR_FUTURE))
        .unwrap_or(started)
}

/// One readiness check against an address.
pub trait ReadinessProbe: Send + Sync {
    fn probe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, bool>;
}

/// Ready once a TCP connection to `port` succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    pub port: u16,
    pub connect_timeout: Duration,
}

impl From<&ReadinessConfig> for TcpProbe {
    fn from(config: &ReadinessConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout: config.connect_timeout(),
        }
    }
}

impl ReadinessProbe for TcpProbe {
    fn probe<'a>(&'a self, address: &'a str) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            match tokio::time::timeout(
                self.connect_timeout,
                TcpStream::connect((address, self.port)),
            )
            .await
            {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(%address, port = self.port, error = %e, "readiness connect failed");
                    false
                }
                Err(_) => {
                    debug!(%address, port = self.port, "readiness connect timed out");
                    false
                }
            }
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReadinessPolicy {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// How the deployer waits before its first remote command.
pub enum Readiness {
    /// Poll `probe` with exponential backoff until it succeeds or `policy.timeout` passes.
    Poll {
        probe: Box<dyn ReadinessProbe>,
        policy: ReadinessPolicy,
    },
    /// Sleep a fixed period and assume the host is up.
    Grace(Duration),
}

impl Readiness {
    pub fn from_config(config: &ReadinessConfig) -> Self {
        match config.probe {
            ReadinessProbeKind::Grace => Readiness::Grace(config.grace()),
            ReadinessProbeKind::Tcp => Readiness::Poll {
                probe: Box::new(TcpProbe::from(config)),
                policy: ReadinessPolicy {
                    timeout: config.timeout(),
                    initial_backoff: config.initial_backoff(),
                    max_backoff: config.max_backoff(),
                },
            },
        }
    }

    pub async fn wait(&self, address: &str) -> Result<(), DeployError> {
        match self {
            Readiness::Grace(period) => {
                info!(%address, grace_secs = period.as_secs(), "waiting fixed grace period");
                tokio::time::sleep(*period).await;
                Ok(())
            }
            Readiness::Poll { probe, policy } => poll_until_ready(probe.as_ref(), address, policy).await,
        }
    }
}

async fn poll_until_ready(
    probe: &dyn ReadinessProbe,
    address: &str,
    policy: &ReadinessPolicy,
) -> Result<(), DeployError> {
    let started = Instant::now();
    let deadline = deadline_after(started, policy.timeout);
    let mut backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if probe.probe(address).await {
            info!(
                %address,
                attempts,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "instance ready"
            );
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(DeployError::Timeout {
                address: address.to_string(),
                waited: policy.timeout,
            });
        }
        let delay = backoff.next_delay().min(deadline - now);
        debug!(%address, attempts, delay_ms = delay.as_millis() as u64, "instance not ready yet");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ready after a fixed number of failed probes.
    struct CountingProbe {
        failures_before_ready: u32,
        calls: AtomicU32,
    }

    impl ReadinessProbe for CountingProbe {
        fn probe<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let ready = n >= self.failures_before_ready;
            Box::pin(async move { ready })
        }
    }

    fn fast_policy(timeout: Duration) -> ReadinessPolicy {
        ReadinessPolicy {
            timeout,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn ready_after_retries() {
        let probe = CountingProbe {
            failures_before_ready: 3,
            calls: AtomicU32::new(0),
        };
        poll_until_ready(&probe, "10.0.0.1", &fast_policy(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn never_ready_times_out() {
        let probe = CountingProbe {
            failures_before_ready: u32::MAX,
            calls: AtomicU32::new(0),
        };
        let err = poll_until_ready(&probe, "10.0.0.1", &fast_policy(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Timeout { ref address, .. } if address == "10.0.0.1"));
        assert!(probe.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn unbounded_timeout_still_polls() {
        let probe = CountingProbe {
            failures_before_ready: 1,
            calls: AtomicU32::new(0),
        };
        poll_until_ready(&probe, "10.0.0.1", &fast_policy(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deadline_saturates_on_overflow() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::from_secs(3)), now + Duration::from_secs(3));
        assert!(deadline_after(now, Duration::MAX) > now + Duration::from_secs(86400 * 365));
    }

    #[test]
    fn connect_timeout_is_its_own_setting() {
        let config = ReadinessConfig {
            port: 2222,
            max_backoff: "20s".to_string(),
            connect_timeout: "750ms".to_string(),
            ..Default::default()
        };
        let probe = TcpProbe::from(&config);
        assert_eq!(probe.port, 2222);
        assert_eq!(probe.connect_timeout, Duration::from_millis(750));
    }

    #[tokio::test]
    async fn tcp_probe_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpProbe {
            port,
            connect_timeout: Duration::from_secs(1),
        };
        assert!(probe.probe("127.0.0.1").await);

        drop(listener);
        assert!(!probe.probe("127.0.0.1").await);
    }

    #[test]
    fn grace_config_skips_probing() {
        let config = ReadinessConfig {
            probe: ReadinessProbeKind::Grace,
            grace: "45s".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Readiness::from_config(&config),
            Readiness::Grace(d) if d == Duration::from_secs(45)
        ));
    }
}
