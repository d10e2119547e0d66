//! Upstream dialing and client stream abstractions.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Opens connections to upstream addresses.
///
/// Used both by forwarding and by the active prober, so test doubles replace
/// every network dial of the engine.
pub trait Dialer: Send + Sync + 'static {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(&self, addr: &str) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// Plain TCP dialer with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("connect to {} timed out", addr)))??;

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(upstream = %addr, error = %e, "Failed to set TCP_NODELAY");
        }
        Ok(stream)
    }
}

/// A bidirectional client byte stream the engine can forward.
pub trait ProxyStream: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Identity of the remote peer, for diagnostics.
    fn peer_label(&self) -> String;
}

impl ProxyStream for TcpStream {
    fn peer_label(&self) -> String {
        self.peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

impl ProxyStream for tokio_rustls::server::TlsStream<TcpStream> {
    fn peer_label(&self) -> String {
        self.get_ref().0.peer_label()
    }
}

impl ProxyStream for DuplexStream {
    fn peer_label(&self) -> String {
        "in-memory".to_string()
    }
}
