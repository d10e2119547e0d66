//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Every upstream the engine knows about, as `host:port`. Fixed for the engine's lifetime.
    pub upstreams: Vec<String>,

    /// Client identifiers and the upstreams each may use.
    pub clients: Vec<ClientConfig>,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,

    /// Optional mutual TLS configuration. Without it clients are identified by IP.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8888".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// Mutual TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// CA certificate (PEM) that client certificates must chain to.
    pub ca_path: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// One authorized client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClientConfig {
    /// Certificate Common Name, or peer IP when TLS is off.
    pub id: String,

    /// Upstreams this client may be forwarded to, in preference order.
    pub upstreams: Vec<String>,
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable active health checks. Without them unhealthy upstreams never recover.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Probe dial timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_ms: 1000,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Absolute read deadline on the upstream side of each pipe, in seconds.
    pub stream_deadline_secs: u64,

    /// How long shutdown waits for in-flight connections, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            stream_deadline_secs: 300,
            drain_secs: 1,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Burst capacity per client.
    pub burst: u32,

    /// Sustained connections per second per client.
    pub rate: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { burst: 20, rate: 20 }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of upstream connection attempts per forward.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str(r#"upstreams = ["localhost:9801"]"#).unwrap();
        assert_eq!(config.upstreams, vec!["localhost:9801"]);
        assert_eq!(config.rate_limit, RateLimitConfig { burst: 20, rate: 20 });
        assert_eq!(config.retries.max_attempts, 3);
        assert_eq!(config.health_check.interval_secs, 10);
        assert!(config.listener.tls.is_none());
    }

    #[test]
    fn parses_clients_and_tls() {
        let config: ProxyConfig = toml::from_str(
            r#"
            upstreams = ["localhost:9801", "localhost:9802"]

            [listener]
            bind_address = "127.0.0.1:8888"

            [listener.tls]
            ca_path = "certs/ca.pem"
            cert_path = "certs/server.pem"
            key_path = "certs/server.key"

            [[clients]]
            id = "client1.lb.com"
            upstreams = ["localhost:9801", "localhost:9802"]

            [[clients]]
            id = "client2.lb.com"
            upstreams = ["localhost:9802"]
            "#,
        )
        .unwrap();

        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.clients[1].upstreams, vec!["localhost:9802"]);
        assert_eq!(config.listener.tls.unwrap().ca_path, "certs/ca.pem");
        assert_eq!(config.listener.max_connections, 10_000);
    }
}
