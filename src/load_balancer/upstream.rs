//! Upstream abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server
//! - Track in-flight forwards (for Least Connections LB)
//! - Embed the health flag and the prober's shutdown signal

use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::health::state::HealthTracker;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// A single upstream server.
#[derive(Debug)]
pub struct Upstream {
    /// `host:port` dialed over TCP.
    address: String,
    /// Number of in-flight forwarded connections. Signed so underflow is visible.
    load: AtomicI64,
    health: HealthTracker,
    /// Stops this upstream's active prober.
    health_check: Shutdown,
}

impl Upstream {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            load: AtomicI64::new(0),
            health: HealthTracker::new(),
            health_check: Shutdown::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Current number of in-flight forwards.
    pub fn load(&self) -> i64 {
        self.load.load(Ordering::Acquire)
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health.is_unhealthy()
    }

    pub fn mark_healthy(&self) -> bool {
        self.health.mark_healthy(&self.address)
    }

    pub fn mark_unhealthy(&self) -> bool {
        self.health.mark_unhealthy(&self.address)
    }

    pub(crate) fn health_check(&self) -> &Shutdown {
        &self.health_check
    }

    /// Count one in-flight forward until the guard is dropped.
    pub fn acquire(self: &Arc<Self>) -> LoadGuard {
        let load = self.load.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_upstream_load(&self.address, load);
        LoadGuard {
            upstream: self.clone(),
        }
    }

    fn release(&self) {
        let prev = self.load.fetch_sub(1, Ordering::AcqRel);
        if prev <= 0 {
            tracing::warn!(
                upstream = %self.address,
                load = prev - 1,
                "Upstream load dropped below zero"
            );
        }
        metrics::record_upstream_load(&self.address, prev - 1);
    }
}

/// A RAII guard that manages the upstream's load counter.
#[derive(Debug)]
pub struct LoadGuard {
    upstream: Arc<Upstream>,
}

impl Deref for LoadGuard {
    type Target = Upstream;
    fn deref(&self) -> &Self::Target {
        &self.upstream
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.upstream.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_counts_in_flight() {
        let upstream = Arc::new(Upstream::new("127.0.0.1:9801"));
        assert_eq!(upstream.load(), 0);

        let g1 = upstream.acquire();
        let g2 = upstream.acquire();
        assert_eq!(upstream.load(), 2);
        assert_eq!(g1.address(), "127.0.0.1:9801");

        drop(g1);
        assert_eq!(upstream.load(), 1);
        drop(g2);
        assert_eq!(upstream.load(), 0);
    }

    #[test]
    fn underflow_is_not_fatal() {
        let upstream = Upstream::new("127.0.0.1:9801");
        upstream.release();
        assert_eq!(upstream.load(), -1);
    }
}
