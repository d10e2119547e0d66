//! Bidirectional byte copy between a client and an upstream.
//!
//! # Termination
//! - client EOF: half-close the upstream write side, keep reading the upstream
//! - upstream EOF or deadline: shut down the client write side, tear down the
//!   client→upstream copy
//! - client→upstream error: tear down both directions
//!
//! Deadline expiry, use of a closed socket and the client hanging up are
//! normal teardown, not failures.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

use crate::error::{CopyFailure, Direction};

const RELAY_BUFFER: usize = 16 * 1024;

/// Bytes moved in each direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipeStats {
    pub bytes_to_upstream: u64,
    pub bytes_to_client: u64,
}

/// Which socket of the pipe an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Client,
    Upstream,
}

/// Copy both directions until the upstream side finishes or `deadline` passes.
///
/// The deadline bounds reads from the upstream and is fixed by the caller once,
/// right after dialing.
pub async fn pipe<C, U>(client: C, upstream: U, deadline: Instant) -> Result<PipeStats, Vec<CopyFailure>>
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    U: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);
    let to_upstream_bytes = AtomicU64::new(0);
    let to_client_bytes = AtomicU64::new(0);

    let client_to_upstream = async {
        let relayed = relay(
            &mut client_read,
            &mut upstream_write,
            (Endpoint::Client, Endpoint::Upstream),
            &to_upstream_bytes,
        )
        .await;
        let _ = upstream_write.shutdown().await;
        relayed
    };

    let upstream_to_client = async {
        let relayed = relay(
            &mut upstream_read,
            &mut client_write,
            (Endpoint::Upstream, Endpoint::Client),
            &to_client_bytes,
        );
        let relayed = match timeout_at(deadline, relayed).await {
            Ok(res) => res,
            Err(_) => Err((
                Endpoint::Upstream,
                io::Error::new(io::ErrorKind::TimedOut, "upstream read deadline expired"),
            )),
        };
        let _ = client_write.shutdown().await;
        relayed
    };

    tokio::pin!(client_to_upstream);
    tokio::pin!(upstream_to_client);

    let (to_upstream, to_client) = tokio::select! {
        res = &mut upstream_to_client => {
            // the client side is done; the other copy ends with it
            (Ok(()), res)
        }
        res = &mut client_to_upstream => {
            match res {
                Ok(()) => (Ok(()), upstream_to_client.await),
                Err(e) => (Err(e), Ok(())),
            }
        }
    };

    let stats = PipeStats {
        bytes_to_upstream: to_upstream_bytes.load(Ordering::Relaxed),
        bytes_to_client: to_client_bytes.load(Ordering::Relaxed),
    };
    let mut failures = Vec::new();

    for (direction, result) in [
        (Direction::ClientToUpstream, to_upstream),
        (Direction::UpstreamToClient, to_client),
    ] {
        if let Err((endpoint, source)) = result {
            if !is_expected_termination(endpoint, &source) {
                failures.push(CopyFailure { direction, source });
            }
        }
    }

    if failures.is_empty() {
        Ok(stats)
    } else {
        Err(failures)
    }
}

/// Copy `reader` into `writer` until EOF, tagging errors with the failing socket.
async fn relay<R, W>(
    reader: &mut R,
    writer: &mut W,
    (from, to): (Endpoint, Endpoint),
    copied: &AtomicU64,
) -> Result<(), (Endpoint, io::Error)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER];
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| (from, e))?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await.map_err(|e| (to, e))?;
        writer.flush().await.map_err(|e| (to, e))?;
        copied.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// Whether an error on `endpoint` ends a pipe normally.
///
/// Deadline expiry and use of a closed socket are normal on either side. A
/// client that hangs up (broken pipe, reset, abort) is normal; the same
/// errors from the upstream are failures.
pub fn is_expected_termination(endpoint: Endpoint, err: &io::Error) -> bool {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::NotConnected => true,
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
            endpoint == Endpoint::Client
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn copies_both_directions() {
        let (client, mut client_peer) = duplex(1024);
        let (upstream, mut upstream_peer) = duplex(1024);

        let server = tokio::spawn(async move {
            let mut buf = Vec::new();
            upstream_peer.read_to_end(&mut buf).await.unwrap();
            upstream_peer.write_all(b"pong").await.unwrap();
            upstream_peer.shutdown().await.unwrap();
            buf
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        let handle = tokio::spawn(pipe(client, upstream, deadline));

        client_peer.write_all(b"ping").await.unwrap();
        client_peer.shutdown().await.unwrap();
        let mut response = Vec::new();
        client_peer.read_to_end(&mut response).await.unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(server.await.unwrap(), b"ping");
        assert_eq!(response, b"pong");
        assert_eq!(stats, PipeStats { bytes_to_upstream: 4, bytes_to_client: 4 });
    }

    #[tokio::test]
    async fn deadline_ends_idle_pipe_cleanly() {
        let (client, _client_peer) = duplex(64);
        let (upstream, _upstream_peer) = duplex(64);

        let deadline = Instant::now() + Duration::from_millis(50);
        let res = tokio::time::timeout(Duration::from_secs(5), pipe(client, upstream, deadline))
            .await
            .expect("pipe should end at its deadline");
        assert!(res.is_ok());
    }

    #[tokio::test]
    async fn upstream_close_tears_down_idle_client() {
        let (client, mut client_peer) = duplex(64);
        let (upstream, upstream_peer) = duplex(64);
        drop(upstream_peer);

        let deadline = Instant::now() + Duration::from_secs(30);
        let res = tokio::time::timeout(Duration::from_secs(5), pipe(client, upstream, deadline))
            .await
            .expect("pipe should end when upstream closes");
        assert!(res.is_ok());

        let mut buf = Vec::new();
        client_peer.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn client_hang_up_before_reply_is_clean() {
        let (client, client_peer) = duplex(64);
        let (upstream, mut upstream_peer) = duplex(64);
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(async move {
            let mut request = [0u8; 4];
            upstream_peer.read_exact(&mut request).await.unwrap();
            reply_rx.await.unwrap();
            // the client is gone by now; this reply has nowhere to go
            let _ = upstream_peer.write_all(b"pong").await;
            let _ = upstream_peer.shutdown().await;
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        let handle = tokio::spawn(pipe(client, upstream, deadline));

        let mut client_peer = client_peer;
        client_peer.write_all(b"ping").await.unwrap();
        drop(client_peer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        reply_tx.send(()).unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.bytes_to_upstream, 4);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn upstream_first_still_counts_client_bytes() {
        let (client, mut client_peer) = duplex(64);
        let (upstream, mut upstream_peer) = duplex(64);

        let server = tokio::spawn(async move {
            let mut request = [0u8; 4];
            upstream_peer.read_exact(&mut request).await.unwrap();
            upstream_peer.write_all(b"pong").await.unwrap();
            upstream_peer.shutdown().await.unwrap();
            // keep the read side open so only the upstream finishes
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        let handle = tokio::spawn(pipe(client, upstream, deadline));

        client_peer.write_all(b"ping").await.unwrap();
        let mut response = Vec::new();
        client_peer.read_to_end(&mut response).await.unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(response, b"pong");
        assert_eq!(stats, PipeStats { bytes_to_upstream: 4, bytes_to_client: 4 });
        server.await.unwrap();
    }

    #[test]
    fn expected_signatures() {
        use io::ErrorKind::*;
        for endpoint in [Endpoint::Client, Endpoint::Upstream] {
            assert!(is_expected_termination(endpoint, &io::Error::from(TimedOut)));
            assert!(is_expected_termination(endpoint, &io::Error::from(NotConnected)));
        }
        for kind in [BrokenPipe, ConnectionReset, ConnectionAborted] {
            assert!(is_expected_termination(Endpoint::Client, &io::Error::from(kind)));
            assert!(!is_expected_termination(Endpoint::Upstream, &io::Error::from(kind)));
        }
    }
}
