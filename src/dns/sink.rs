//! Destinations for DNS responses.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::net::UdpSocket;

use crate::forward::transport::write_frame;

/// Where the middleware writes its reply to a query.
#[async_trait]
pub trait ResponseSink: Send {
    async fn send(&mut self, response: &[u8]) -> io::Result<()>;
}

/// Replies to one UDP client through the shared listening socket.
#[derive(Debug, Clone)]
pub struct UdpSink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpSink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

#[async_trait]
impl ResponseSink for UdpSink {
    async fn send(&mut self, response: &[u8]) -> io::Result<()> {
        self.socket.send_to(response, self.peer).await.map(|_| ())
    }
}

/// Writes length-prefixed replies on a TCP connection.
#[derive(Debug)]
pub struct TcpSink<W> {
    writer: W,
}

impl<W> TcpSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> ResponseSink for TcpSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, response: &[u8]) -> io::Result<()> {
        write_frame(&mut self.writer, response).await
    }
}

/// Collects replies in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub responses: Vec<Vec<u8>>,
}

#[async_trait]
impl ResponseSink for BufferSink {
    async fn send(&mut self, response: &[u8]) -> io::Result<()> {
        self.responses.push(response.to_vec());
        Ok(())
    }
}
