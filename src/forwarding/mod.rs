//! Connection forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Admitted client stream + allow-list
//!     → engine.rs (pick least loaded healthy upstream)
//!     → dialer.rs (connect; on failure mark unhealthy and retry)
//!     → pipe.rs (copy both directions until done)
//!     → release load, return aggregated result
//! ```
//!
//! # Design Decisions
//! - Only connection establishment is retried; data-path errors surface
//! - Bounded attempts, no backoff: failover goes to a different upstream
//! - The dialer is a trait so tests never need real upstreams

pub mod dialer;
pub mod engine;
pub mod pipe;

pub use dialer::{Dialer, ProxyStream, TcpDialer};
pub use engine::{EngineConfig, Forwarder, ForwardingEngine};
pub use pipe::PipeStats;
