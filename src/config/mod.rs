//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → balancer (upstreams, rate limit, retries, health) and server (listener, clients)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the client allow-list table
//! ```
//!
//! # Design Decisions
//! - The upstream set is fixed at startup; only client allow-lists reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, resolve_config, ConfigError};
pub use schema::{
    ClientConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig, ProxyConfig, RateLimitConfig,
    RetryConfig, TimeoutConfig, TlsConfig,
};
