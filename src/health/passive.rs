//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe dial outcomes while forwarding
//! - Mark the upstream unhealthy on the first failed dial
//!
//! # Design Decisions
//! - Only connection establishment failures count; data-path errors do not
//! - No threshold: one failed dial evicts until an active probe succeeds

use std::io;

use crate::load_balancer::Upstream;
use crate::observability::metrics;

/// Record a failed dial to `upstream` during forwarding.
pub fn record_dial_failure(upstream: &Upstream, error: &io::Error) {
    metrics::record_dial_failure(upstream.address());
    if upstream.mark_unhealthy() {
        tracing::debug!(
            upstream = %upstream.address(),
            error = %error,
            "Marking upstream unhealthy after failed dial"
        );
    }
}
