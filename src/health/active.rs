//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe one upstream with a bounded TCP dial
//! - Update the upstream's health state based on results

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant};

use crate::config::HealthCheckConfig;
use crate::forwarding::Dialer;
use crate::load_balancer::Upstream;

/// Background prober for a single upstream.
pub struct HealthProber<D: Dialer> {
    upstream: Arc<Upstream>,
    dialer: Arc<D>,
    interval: Duration,
    timeout: Duration,
}

impl<D: Dialer> HealthProber<D> {
    pub fn new(upstream: Arc<Upstream>, dialer: Arc<D>, config: &HealthCheckConfig) -> Self {
        Self {
            upstream,
            dialer,
            interval: Duration::from_secs(config.interval_secs),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Probe until `shutdown` fires. The first probe runs one interval after start.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(
            upstream = %self.upstream.address(),
            interval_secs = self.interval.as_secs(),
            "Health prober starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::debug!(upstream = %self.upstream.address(), "Health prober stopped");
                    break;
                }
            }
        }
    }

    /// One liveness dial. The connection, if any, is closed right away.
    pub async fn check(&self) -> bool {
        let addr = self.upstream.address();
        let healthy = match time::timeout(self.timeout, self.dialer.dial(addr)).await {
            Ok(Ok(conn)) => {
                drop(conn);
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(upstream = %addr, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(upstream = %addr, "Health check failed: timeout");
                false
            }
        };

        if healthy {
            self.upstream.mark_healthy();
        } else {
            self.upstream.mark_unhealthy();
        }
        healthy
    }
}
