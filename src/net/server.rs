//! Accept loop: identify each client, authorize it, hand it to the balancer.
//!
//! # Data Flow
//! ```text
//! Listener::accept
//!     → TLS handshake (client id = certificate CN) | plain TCP (client id = peer IP)
//!     → AuthScheme lookup (unknown client → close)
//!     → Balancer::balance
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use crate::balancer::{Balance, Balancer};
use crate::config::ProxyConfig;
use crate::forwarding::ProxyStream;
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener};
use crate::net::tls::{self, TlsError};
use crate::security::AuthScheme;

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause after consecutive accept failures, doubling up to a ceiling.
#[derive(Debug)]
struct AcceptBackoff {
    next: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self { next: ACCEPT_BACKOFF_MIN }
    }

    fn failed(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(ACCEPT_BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.next = ACCEPT_BACKOFF_MIN;
    }
}

pub struct ProxyServer<B: Balance = Balancer> {
    balancer: Arc<B>,
    auth: Arc<ArcSwap<AuthScheme>>,
    tls: Option<TlsAcceptor>,
    tracker: ConnectionTracker,
    config: ProxyConfig,
}

impl ProxyServer {
    /// Server with a balancer built from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, TlsError> {
        let balancer = Balancer::from_config(&config);
        Self::with_balancer(config, balancer)
    }
}

impl<B: Balance + 'static> ProxyServer<B> {
    pub fn with_balancer(config: ProxyConfig, balancer: B) -> Result<Self, TlsError> {
        let tls = config.listener.tls.as_ref().map(tls::build_acceptor).transpose()?;
        if tls.is_none() {
            tracing::warn!("TLS not configured, identifying clients by peer IP");
        }
        Ok(Self {
            balancer: Arc::new(balancer),
            auth: Arc::new(ArcSwap::from_pointee(AuthScheme::from_config(&config.clients))),
            tls,
            tracker: ConnectionTracker::new(),
            config,
        })
    }

    pub fn balancer(&self) -> &Arc<B> {
        &self.balancer
    }

    /// Snapshot of the client allow-lists in effect.
    pub fn auth_scheme(&self) -> Arc<AuthScheme> {
        self.auth.load_full()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// Apply a reloaded configuration. Only the client table changes live.
    pub fn apply_config(&mut self, next: ProxyConfig) {
        let restart_needed = next.listener != self.config.listener
            || next.upstreams != self.config.upstreams
            || next.health_check != self.config.health_check
            || next.timeouts != self.config.timeouts
            || next.rate_limit != self.config.rate_limit
            || next.retries != self.config.retries
            || next.observability != self.config.observability;
        if restart_needed {
            tracing::warn!("Config changes outside [[clients]] take effect after restart");
        }

        if next.clients != self.config.clients {
            let scheme = AuthScheme::from_config(&next.clients);
            tracing::info!(clients = scheme.len(), "Client allow-lists reloaded");
            self.auth.store(Arc::new(scheme));
        }
        self.config = next;
    }

    /// Serve until `shutdown` fires, then drain in-flight connections.
    pub async fn run(
        mut self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, tls = self.tls.is_some(), "Proxy server starting");
        }
        let mut updates_open = true;
        let mut backoff = AcceptBackoff::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
                update = config_updates.recv(), if updates_open => match update {
                    Some(next) => self.apply_config(next),
                    None => updates_open = false,
                },
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        backoff.reset();
                        self.spawn_connection(stream, peer, permit);
                    }
                    Err(e) => {
                        let delay = backoff.failed();
                        tracing::error!(error = %e, retry_in_ms = delay.as_millis() as u64, "Accept failed");
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        drop(listener);
        self.balancer.stop();

        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        if !self.tracker.drain(drain).await {
            tracing::warn!(
                in_flight = self.tracker.active_count(),
                drain_secs = self.config.timeouts.drain_secs,
                "Connections still open after drain period"
            );
        }
        tracing::info!("Proxy server stopped");
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr, permit: ConnectionPermit) {
        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
        let balancer = Arc::clone(&self.balancer);
        let auth = Arc::clone(&self.auth);
        let tls = self.tls.clone();

        tokio::spawn(
            async move {
                let _slot: (ConnectionPermit, ConnectionGuard) = (permit, guard);
                serve_connection(balancer.as_ref(), &auth, tls, stream, peer).await;
            }
            .instrument(span),
        );
    }
}

async fn serve_connection<B: Balance>(
    balancer: &B,
    auth: &ArcSwap<AuthScheme>,
    tls: Option<TlsAcceptor>,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let Some(acceptor) = tls else {
        dispatch(balancer, auth, stream, peer.ip().to_string()).await;
        return;
    };

    let stream = match acceptor.accept(stream).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "TLS handshake failed");
            return;
        }
    };
    match tls::peer_identity(&stream) {
        Some(client_id) => dispatch(balancer, auth, stream, client_id).await,
        None => tracing::warn!("Client certificate has no Common Name"),
    }
}

async fn dispatch<B: Balance, S: ProxyStream>(
    balancer: &B,
    auth: &ArcSwap<AuthScheme>,
    stream: S,
    client_id: String,
) {
    let scheme = auth.load_full();
    let Some(allowed) = scheme.allowed_upstreams(&client_id) else {
        tracing::warn!(client = %client_id, "Client not allowed");
        return;
    };

    match balancer.balance(stream, &client_id, allowed).await {
        Ok(()) => tracing::debug!(client = %client_id, "Connection finished"),
        Err(e) if e.is_rate_limited() => tracing::debug!(client = %client_id, error = %e, "Connection rejected"),
        Err(e) => tracing::error!(client = %client_id, error = %e, "Forwarding failed"),
    }
}
