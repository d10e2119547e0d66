//! Least-connections TCP load balancer library.

pub mod balancer;
pub mod config;
pub mod error;
pub mod forwarding;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;
pub mod security;

pub use balancer::{Balance, Balancer};
pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use forwarding::{Forwarder, ForwardingEngine};
pub use lifecycle::Shutdown;
pub use net::ProxyServer;
