//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{upstream::Upstream, LoadBalancer};

/// Least connections selector.
/// Selects the healthy upstream with the minimum number of in-flight forwards.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, candidates: &[Arc<Upstream>]) -> Option<Arc<Upstream>> {
        // min_by_key keeps the first of equal minima, so ties follow allow-list order
        candidates
            .iter()
            .filter(|u| !u.is_unhealthy())
            .min_by_key(|u| u.load())
            .cloned()
    }
}
