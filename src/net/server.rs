//! UDP and TCP DNS listener.
//!
//! # Responsibilities
//! - Bind UDP and TCP on the same address
//! - Hand every datagram and every TCP message to the middleware in its own task
//! - Bound concurrency with semaphores (in-flight UDP queries, TCP connections)
//! - Close idle TCP connections
//! - On shutdown stop accepting and abort in-flight work

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;

use crate::config::ListenerConfig;
use crate::dns::{ProxyMiddleware, TcpSink, UdpSink};
use crate::forward::transport::{read_frame, MAX_TCP_MESSAGE_SIZE};
use crate::forward::Protocol;
use crate::lifecycle::ShutdownSignal;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid bind address `{0}`")]
    InvalidAddress(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// A bound DNS listener, not yet serving.
pub struct DnsServer {
    udp: Arc<UdpSocket>,
    tcp: TcpListener,
    max_inflight_queries: usize,
    max_tcp_connections: usize,
    tcp_idle: Duration,
}

impl DnsServer {
    /// Bind UDP, then TCP on the port UDP actually got (so port 0 works).
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(config.bind_address.clone()))?;

        let udp = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = udp
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let tcp = TcpListener::bind(local)
            .await
            .map_err(|source| ServerError::Bind { addr: local, source })?;

        tracing::info!(
            address = %local,
            max_inflight_queries = config.max_inflight_queries,
            max_tcp_connections = config.max_tcp_connections,
            "DNS listener bound"
        );

        Ok(Self {
            udp: Arc::new(udp),
            tcp,
            max_inflight_queries: config.max_inflight_queries,
            max_tcp_connections: config.max_tcp_connections,
            tcp_idle: Duration::from_secs(config.tcp_idle_secs),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    /// Serve until `shutdown` fires.
    pub async fn run(self, middleware: ProxyMiddleware, mut shutdown: ShutdownSignal) {
        let udp_limit = Arc::new(Semaphore::new(self.max_inflight_queries));
        let tcp_limit = Arc::new(Semaphore::new(self.max_tcp_connections));
        let mut tasks = JoinSet::new();
        let mut buf = vec![0u8; MAX_TCP_MESSAGE_SIZE];

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,

                received = self.udp.recv_from(&mut buf) => {
                    let (len, peer) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            tracing::debug!(error = %e, "UDP receive error");
                            continue;
                        }
                    };
                    let Ok(permit) = udp_limit.clone().try_acquire_owned() else {
                        tracing::warn!(peer = %peer, "Too many in-flight queries, dropping datagram");
                        continue;
                    };

                    let query = buf[..len].to_vec();
                    let middleware = middleware.clone();
                    let mut sink = UdpSink::new(self.udp.clone(), peer);
                    tasks.spawn(async move {
                        let _permit = permit;
                        middleware.handle(&query, Protocol::Udp, &mut sink).await;
                    });
                }

                accepted = self.tcp.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!(error = %e, "TCP accept error");
                            continue;
                        }
                    };
                    let Ok(permit) = tcp_limit.clone().try_acquire_owned() else {
                        tracing::warn!(peer = %peer, "TCP connection limit reached, closing connection");
                        continue;
                    };

                    tracing::debug!(
                        peer = %peer,
                        available = tcp_limit.available_permits(),
                        "TCP connection accepted"
                    );
                    let middleware = middleware.clone();
                    let idle = self.tcp_idle;
                    tasks.spawn(async move {
                        let _permit = permit;
                        serve_tcp(stream, peer, middleware, idle).await;
                    });
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "Query task panicked");
                        }
                    }
                }
            }
        }

        tracing::info!(in_flight = tasks.len(), "DNS listener shutting down");
        tasks.shutdown().await;
    }
}

/// Answer length-prefixed queries on one connection until EOF or idle timeout.
async fn serve_tcp(stream: TcpStream, peer: SocketAddr, middleware: ProxyMiddleware, idle: Duration) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();
    let mut sink = TcpSink::new(writer);

    loop {
        let query = match time::timeout(idle, read_frame(&mut reader)).await {
            Ok(Ok(query)) => query,
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Ok(Err(e)) => {
                tracing::debug!(peer = %peer, error = %e, "TCP read error");
                break;
            }
            Err(_) => {
                tracing::debug!(peer = %peer, idle_secs = idle.as_secs(), "Closing idle TCP connection");
                break;
            }
        };
        middleware.handle(&query, Protocol::Tcp, &mut sink).await;
    }

    tracing::trace!(peer = %peer, "TCP connection closed");
}
