//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Per-upstream timer
//!     → Bounded TCP dial
//!     → Update state.rs
//!
//! Passive health checks (passive.rs):
//!     Dial failure while forwarding
//!     → Mark unhealthy immediately
//!
//! State machine (state.rs):
//!     Healthy ←→ Unhealthy
//!     Only an active probe restores Healthy
//! ```
//!
//! # Design Decisions
//! - Active and passive checks are complementary
//! - One prober task per upstream, stopped through the upstream's own signal
//! - Health state is per-upstream, read lock-free

pub mod active;
pub mod passive;
pub mod state;

pub use active::HealthProber;
pub use state::{HealthState, HealthTracker};
