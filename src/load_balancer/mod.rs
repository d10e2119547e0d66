//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Client allow-list (ordered upstream addresses)
//!     → resolve against the engine's fixed upstream set
//!     → least_conn.rs (healthy upstream with fewest in-flight forwards)
//!     → upstream.rs (LoadGuard held for the lifetime of the pipe)
//! ```
//!
//! # Design Decisions
//! - Load counters and health flags are per-upstream atomics, no global lock
//! - Unhealthy upstreams excluded from selection
//! - Ties resolve to allow-list order, never randomized

pub mod least_conn;
pub mod upstream;

use std::sync::Arc;

pub use least_conn::LeastConnections;
pub use upstream::{LoadGuard, Upstream};

/// Strategy for picking one upstream out of an ordered candidate list.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    fn next_server(&self, candidates: &[Arc<Upstream>]) -> Option<Arc<Upstream>>;
}
