//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (client allow-lists reference known upstreams)
//! - Validate value ranges (rates, attempts and intervals > 0, ports valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no upstreams configured")]
    NoUpstreams,
    #[error("upstream address {0:?} is not host:port")]
    InvalidAddress(String),
    #[error("upstream {0} listed twice")]
    DuplicateUpstream(String),
    #[error("client {0} listed twice")]
    DuplicateClient(String),
    #[error("client {client} references unknown upstream {upstream}")]
    UnknownUpstream { client: String, upstream: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.upstreams.is_empty() {
        errors.push(ValidationError::NoUpstreams);
    }

    let mut known = HashSet::new();
    for addr in &config.upstreams {
        if !is_host_port(addr) {
            errors.push(ValidationError::InvalidAddress(addr.clone()));
        }
        if !known.insert(addr.as_str()) {
            errors.push(ValidationError::DuplicateUpstream(addr.clone()));
        }
    }

    let mut clients = HashSet::new();
    for client in &config.clients {
        if !clients.insert(client.id.as_str()) {
            errors.push(ValidationError::DuplicateClient(client.id.clone()));
        }
        for upstream in &client.upstreams {
            if !known.contains(upstream.as_str()) {
                errors.push(ValidationError::UnknownUpstream {
                    client: client.id.clone(),
                    upstream: upstream.clone(),
                });
            }
        }
    }

    let ranges = [
        ("rate_limit.burst", config.rate_limit.burst as u64),
        ("rate_limit.rate", config.rate_limit.rate as u64),
        ("retries.max_attempts", config.retries.max_attempts as u64),
        ("health_check.interval_secs", config.health_check.interval_secs),
        ("health_check.timeout_ms", config.health_check.timeout_ms),
        ("timeouts.stream_deadline_secs", config.timeouts.stream_deadline_secs),
        ("listener.max_connections", config.listener.max_connections as u64),
    ];
    for (name, value) in ranges {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_host_port(addr: &str) -> bool {
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
