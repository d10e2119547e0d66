//! Shared upstream doubles for integration tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use leastconn_proxy::forwarding::{Dialer, TcpDialer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
}

fn http_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    )
}

/// HTTP upstream answering every request with `body`, then closing.
pub async fn start_http_upstream(body: &'static str) -> SocketAddr {
    let (addr, gate) = start_gated_http_upstream(body).await;
    gate.add_permits(Semaphore::MAX_PERMITS / 2);
    addr
}

/// Like `start_http_upstream`, but each response waits for one permit on the gate.
pub async fn start_gated_http_upstream(body: &'static str) -> (SocketAddr, Arc<Semaphore>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let server_gate = gate.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let gate = server_gate.clone();
            tokio::spawn(async move {
                read_request(&mut socket).await;
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
                let _ = socket.write_all(http_response(body).as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (addr, gate)
}

/// Upstream echoing bytes back until the peer half-closes.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = socket.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
                let _ = wr.shutdown().await;
            });
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Send a minimal GET and read the whole response.
pub async fn http_get<S>(stream: &mut S) -> String
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: upstream\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("response should arrive")
        .unwrap();
    response
}

/// TCP dialer that records every address it is asked for.
#[derive(Clone, Default)]
pub struct RecordingDialer {
    inner: TcpDialer,
    pub dials: Arc<Mutex<Vec<String>>>,
}

impl RecordingDialer {
    pub fn dialed(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }
}

impl Dialer for RecordingDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        self.dials.lock().unwrap().push(addr.to_string());
        self.inner.dial(addr).await
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
