//! Error types for the forwarding core.

use std::fmt;
use std::io;

use thiserror::Error;

/// Direction of a single copy task inside a forwarded pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// A data-path failure observed on one direction of a pipe.
#[derive(Debug, Error)]
#[error("{direction}: {source}")]
pub struct CopyFailure {
    pub direction: Direction,
    #[source]
    pub source: io::Error,
}

/// Errors surfaced by the balancer and forwarding engine.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Forward was called without a client stream.
    #[error("no client stream to forward")]
    NilStream,

    /// The client exceeded its admission budget.
    #[error("client {client_id} rate limited")]
    RateLimited { client_id: String },

    /// No attempt managed to connect to an upstream.
    #[error("max retries exceeded for {peer} after {attempts} attempts")]
    MaxRetriesExceeded { peer: String, attempts: u32 },

    /// The pipe to `upstream` ended with unexpected I/O errors.
    #[error("stream copy with {upstream} failed: {}", join_failures(.failures))]
    StreamCopy {
        upstream: String,
        failures: Vec<CopyFailure>,
    },
}

impl ProxyError {
    /// True for admission rejections, which callers close quietly.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProxyError::RateLimited { .. })
    }
}

fn join_failures(failures: &[CopyFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_copy_joins_both_directions() {
        let err = ProxyError::StreamCopy {
            upstream: "10.0.0.1:80".into(),
            failures: vec![
                CopyFailure {
                    direction: Direction::ClientToUpstream,
                    source: io::Error::new(io::ErrorKind::ConnectionReset, "reset"),
                },
                CopyFailure {
                    direction: Direction::UpstreamToClient,
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "pipe"),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "stream copy with 10.0.0.1:80 failed: client->upstream: reset; upstream->client: pipe"
        );
        assert!(!err.is_rate_limited());
    }

    #[test]
    fn rate_limited_is_distinguishable() {
        let err = ProxyError::RateLimited { client_id: "client1.lb.com".into() };
        assert!(err.is_rate_limited());
    }
}
