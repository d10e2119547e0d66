//! Upstream health state machine.
//!
//! # States
//! - Healthy: upstream receives traffic
//! - Unhealthy: upstream excluded from selection
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: failed dial while forwarding (passive) or failed probe (active)
//! Unhealthy → Healthy: successful active probe only
//! ```
//!
//! # Design Decisions
//! - Transitions are compare-and-swap, so repeated observations are silent
//! - Reads never block on the prober

use std::sync::atomic::{AtomicBool, Ordering};

use crate::observability::metrics;

/// Health state enum, for display and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Lock-free health flag embedded in every upstream.
#[derive(Debug)]
pub struct HealthTracker {
    healthy: AtomicBool,
}

impl HealthTracker {
    /// A new tracker starts healthy.
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    pub fn state(&self) -> HealthState {
        if self.healthy.load(Ordering::Acquire) {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }

    pub fn is_unhealthy(&self) -> bool {
        !self.healthy.load(Ordering::Acquire)
    }

    /// Transition to Healthy. Returns true if the state changed.
    pub fn mark_healthy(&self, address: &str) -> bool {
        let swapped = self
            .healthy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            tracing::info!(upstream = %address, "Upstream healthy");
            metrics::record_upstream_health(address, true);
        }
        swapped
    }

    /// Transition to Unhealthy. Returns true if the state changed.
    pub fn mark_unhealthy(&self, address: &str) -> bool {
        let swapped = self
            .healthy
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if swapped {
            tracing::warn!(upstream = %address, "Upstream unhealthy");
            metrics::record_upstream_health(address, false);
        }
        swapped
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
