//! Least-connections forwarding engine.
//!
//! # Responsibilities
//! - Own the fixed upstream set, their load counters and health flags
//! - Run one active prober per upstream until stopped
//! - Pick, dial and pipe; fail over on dial errors only

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{HealthCheckConfig, ProxyConfig};
use crate::error::ProxyError;
use crate::forwarding::dialer::{Dialer, ProxyStream, TcpDialer};
use crate::forwarding::pipe::pipe;
use crate::health::{passive, HealthProber};
use crate::load_balancer::{LeastConnections, LoadBalancer, Upstream};
use crate::observability::metrics;

/// Forwarding capability: move a client stream to some allowed upstream.
pub trait Forwarder: Send + Sync {
    fn forward<S: ProxyStream>(
        &self,
        stream: Option<S>,
        allowed_upstreams: &[String],
    ) -> impl Future<Output = Result<(), ProxyError>> + Send;

    /// Stop background work. Safe to call more than once.
    fn stop(&self);
}

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Connection attempts per forward.
    pub max_attempts: u32,
    /// Absolute read deadline on the upstream side of each pipe.
    pub stream_deadline: Duration,
    pub health_check: HealthCheckConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            stream_deadline: Duration::from_secs(300),
            health_check: HealthCheckConfig::default(),
        }
    }
}

impl From<&ProxyConfig> for EngineConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            max_attempts: config.retries.max_attempts,
            stream_deadline: Duration::from_secs(config.timeouts.stream_deadline_secs),
            health_check: config.health_check.clone(),
        }
    }
}

/// Forwards client streams to the least loaded healthy upstream.
///
/// Must be created inside a Tokio runtime: construction spawns the probers.
pub struct ForwardingEngine<D: Dialer = TcpDialer> {
    upstreams: HashMap<String, Arc<Upstream>>,
    balancer: LeastConnections,
    dialer: Arc<D>,
    config: EngineConfig,
    probers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ForwardingEngine {
    /// Engine over `upstreams` with default settings and a plain TCP dialer.
    pub fn new(upstreams: &[String]) -> Self {
        Self::with_dialer(upstreams, EngineConfig::default(), TcpDialer::default())
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        let dialer = TcpDialer::new(Duration::from_secs(config.timeouts.connect_secs));
        Self::with_dialer(&config.upstreams, EngineConfig::from(config), dialer)
    }
}

impl<D: Dialer> ForwardingEngine<D> {
    pub fn with_dialer(upstreams: &[String], config: EngineConfig, dialer: D) -> Self {
        let dialer = Arc::new(dialer);
        let upstreams: HashMap<String, Arc<Upstream>> = upstreams
            .iter()
            .map(|addr| (addr.clone(), Arc::new(Upstream::new(addr.clone()))))
            .collect();

        let mut probers = Vec::new();
        if config.health_check.enabled {
            for upstream in upstreams.values() {
                let prober = HealthProber::new(upstream.clone(), dialer.clone(), &config.health_check);
                let shutdown = upstream.health_check().subscribe();
                probers.push(tokio::spawn(prober.run(shutdown)));
            }
        } else {
            tracing::warn!("Active health checks disabled, unhealthy upstreams will not recover");
        }

        tracing::info!(
            upstreams = upstreams.len(),
            max_attempts = config.max_attempts,
            stream_deadline_secs = config.stream_deadline.as_secs(),
            "Forwarding engine started"
        );

        Self {
            upstreams,
            balancer: LeastConnections::new(),
            dialer,
            config,
            probers: Mutex::new(probers),
            stopped: AtomicBool::new(false),
        }
    }

    /// Forward `stream` to one of `allowed_upstreams` and pipe until done.
    ///
    /// The stream is closed when this returns, on every path.
    pub async fn forward<S: ProxyStream>(
        &self,
        stream: Option<S>,
        allowed_upstreams: &[String],
    ) -> Result<(), ProxyError> {
        let Some(client) = stream else {
            metrics::record_forward("nil_stream");
            return Err(ProxyError::NilStream);
        };
        let peer = client.peer_label();
        let max_attempts = self.config.max_attempts;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::debug!(peer = %peer, attempt = attempt + 1, "Retrying");
            }

            let Some(upstream) = self.pick_least_loaded(allowed_upstreams) else {
                continue;
            };

            tracing::debug!(peer = %peer, upstream = %upstream.address(), "Forwarding to");

            let conn = match self.dialer.dial(upstream.address()).await {
                Ok(conn) => conn,
                Err(e) => {
                    passive::record_dial_failure(&upstream, &e);
                    continue;
                }
            };

            let deadline = Instant::now() + self.config.stream_deadline;
            let guard = upstream.acquire();
            let result = pipe(client, conn, deadline).await;
            drop(guard);

            return match result {
                Ok(stats) => {
                    tracing::debug!(
                        peer = %peer,
                        upstream = %upstream.address(),
                        bytes_to_upstream = stats.bytes_to_upstream,
                        bytes_to_client = stats.bytes_to_client,
                        "Forward complete"
                    );
                    metrics::record_forward("ok");
                    Ok(())
                }
                Err(failures) => {
                    metrics::record_forward("copy_error");
                    Err(ProxyError::StreamCopy {
                        upstream: upstream.address().to_string(),
                        failures,
                    })
                }
            };
        }

        metrics::record_forward("no_upstream");
        Err(ProxyError::MaxRetriesExceeded {
            peer,
            attempts: max_attempts,
        })
    }

    /// Healthy upstream from `allowed` with the fewest in-flight forwards.
    pub fn pick_least_loaded(&self, allowed: &[String]) -> Option<Arc<Upstream>> {
        let candidates: Vec<Arc<Upstream>> = allowed
            .iter()
            .filter_map(|addr| {
                let upstream = self.upstreams.get(addr);
                if upstream.is_none() {
                    tracing::debug!(upstream = %addr, "Allow-list names an unknown upstream");
                }
                upstream.cloned()
            })
            .collect();
        self.balancer.next_server(&candidates)
    }

    pub fn upstream(&self, addr: &str) -> Option<&Arc<Upstream>> {
        self.upstreams.get(addr)
    }

    /// In-flight forwards to `addr`.
    pub fn load_of(&self, addr: &str) -> Option<i64> {
        self.upstreams.get(addr).map(|u| u.load())
    }

    pub fn is_unhealthy(&self, addr: &str) -> Option<bool> {
        self.upstreams.get(addr).map(|u| u.is_unhealthy())
    }

    /// Signal every prober. In-flight forwards run on to their own end.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for upstream in self.upstreams.values() {
            upstream.health_check().trigger();
        }
        tracing::info!("Forwarding engine stopped");
    }

    /// Stop, then wait for every prober task to exit.
    pub async fn stopped(&self) {
        self.stop();
        let probers = std::mem::take(&mut *self.probers.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in probers {
            let _ = handle.await;
        }
    }
}

impl<D: Dialer> Forwarder for ForwardingEngine<D> {
    fn forward<S: ProxyStream>(
        &self,
        stream: Option<S>,
        allowed_upstreams: &[String],
    ) -> impl Future<Output = Result<(), ProxyError>> + Send {
        ForwardingEngine::<D>::forward(self, stream, allowed_upstreams)
    }

    fn stop(&self) {
        ForwardingEngine::<D>::stop(self)
    }
}

impl<D: Dialer> Drop for ForwardingEngine<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
