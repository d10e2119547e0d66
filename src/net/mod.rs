//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limit)
//!     → tls.rs (optional mutual TLS, client CN)
//!     → connection.rs (in-flight tracking for shutdown drain)
//!     → server.rs (authorization, hand off to the balancer)
//! ```

pub mod connection;
pub mod listener;
pub mod server;
pub mod tls;

pub use listener::{Listener, ListenerError};
pub use server::ProxyServer;
pub use tls::TlsError;
