//! Admission + forwarding for one connection.
//!
//! # Data Flow
//! ```text
//! stream, client id, allow-list
//!     → Limiter::allow(client id)
//!         false → drop (close) stream, RateLimited
//!         true  → Forwarder::forward(stream, allow-list)
//! ```

use std::future::Future;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forwarding::{Forwarder, ForwardingEngine, ProxyStream};
use crate::security::{Limiter, RateLimiter};

/// Balancing capability as seen by the acceptor.
pub trait Balance: Send + Sync {
    fn balance<S: ProxyStream>(
        &self,
        stream: S,
        client_id: &str,
        allowed_upstreams: &[String],
    ) -> impl Future<Output = Result<(), ProxyError>> + Send;

    fn stop(&self);
}

/// Rate-limited front of the forwarding engine.
pub struct Balancer<F: Forwarder = ForwardingEngine, L: Limiter = RateLimiter> {
    forwarder: F,
    limiter: L,
}

impl Balancer {
    /// Balancer over `upstreams` with a `burst`/`rate` token bucket per client.
    pub fn new(burst: u32, rate: u32, upstreams: &[String]) -> Self {
        Self::with_parts(ForwardingEngine::new(upstreams), RateLimiter::new(burst, rate))
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::with_parts(
            ForwardingEngine::from_config(config),
            RateLimiter::new(config.rate_limit.burst, config.rate_limit.rate),
        )
    }
}

impl<F: Forwarder, L: Limiter> Balancer<F, L> {
    pub fn with_parts(forwarder: F, limiter: L) -> Self {
        Self { forwarder, limiter }
    }

    /// Admit `stream` for `client_id`, then forward it to one of `allowed_upstreams`.
    pub async fn balance<S: ProxyStream>(
        &self,
        stream: S,
        client_id: &str,
        allowed_upstreams: &[String],
    ) -> Result<(), ProxyError> {
        if !self.limiter.allow(client_id) {
            drop(stream);
            return Err(ProxyError::RateLimited {
                client_id: client_id.to_string(),
            });
        }
        self.forwarder.forward(Some(stream), allowed_upstreams).await
    }

    /// Stop the forwarder's background work.
    pub fn stop(&self) {
        self.forwarder.stop();
    }

    pub fn forwarder(&self) -> &F {
        &self.forwarder
    }

    pub fn limiter(&self) -> &L {
        &self.limiter
    }
}

impl<F: Forwarder, L: Limiter> Balance for Balancer<F, L> {
    fn balance<S: ProxyStream>(
        &self,
        stream: S,
        client_id: &str,
        allowed_upstreams: &[String],
    ) -> impl Future<Output = Result<(), ProxyError>> + Send {
        Balancer::<F, L>::balance(self, stream, client_id, allowed_upstreams)
    }

    fn stop(&self) {
        Balancer::<F, L>::stop(self)
    }
}
