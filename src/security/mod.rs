//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Authenticated connection (client id from certificate CN or peer IP):
//!     → access_control.rs (client id → allowed upstreams)
//!     → rate_limit.rs (per-client token bucket)
//!     → Pass to forwarding
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown clients are refused
//! - Limiter never blocks; a rejected connection is closed at once

pub mod access_control;
pub mod rate_limit;

pub use access_control::AuthScheme;
pub use rate_limit::{Clock, Limiter, ManualClock, RateLimiter, SystemClock};
