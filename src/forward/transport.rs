//! DNS wire exchange with an upstream over UDP (RFC 1035 §4.2.1) and
//! TCP (§4.2.2, two-byte length prefix).
//!
//! Timeouts are applied by the caller around a whole exchange; every socket
//! lives only as long as the exchange future, so cancelling it releases the
//! socket.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use hickory_proto::error::ProtoError;
use hickory_proto::op::{Message, MessageType, Query};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

/// Largest UDP payload an upstream can send; smaller buffers cut datagrams.
pub const MAX_UDP_RESPONSE_SIZE: usize = u16::MAX as usize;

/// Maximum DNS message size over TCP.
pub const MAX_TCP_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Transport a query arrived on or is sent over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
        })
    }
}

/// Failure of a single forward attempt.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("attempt timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] ProtoError),
    #[error("response id {received} does not match query id {expected}")]
    Mismatch { expected: u16, received: u16 },
    #[error("response question does not match the query")]
    QuestionMismatch,
}

impl AttemptError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptError::Timeout => "timeout",
            AttemptError::Io(_) => "io",
            AttemptError::Decode(_) => "decode",
            AttemptError::Mismatch { .. } | AttemptError::QuestionMismatch => "mismatch",
        }
    }
}

/// A decoded upstream response together with its exact wire bytes.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: Message,
    pub bytes: Vec<u8>,
}

/// Send `wire` (the encoding of `query`) over UDP and wait for its response.
///
/// Datagrams that carry another transaction ID, do not decode, are not
/// responses or answer a different question are discarded and the wait
/// continues. Only socket errors end the exchange early.
pub async fn exchange_udp(
    upstream: SocketAddr,
    wire: &[u8],
    query: &Message,
) -> Result<Reply, AttemptError> {
    let bind_addr: SocketAddr = if upstream.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };

    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(upstream).await?;
    socket.send(wire).await?;

    tracing::trace!(upstream = %upstream, bytes = wire.len(), "UDP query sent");

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    loop {
        let len = socket.recv(&mut buf).await?;
        let datagram = &buf[..len];

        if header_id(datagram) != Some(query.id()) {
            tracing::debug!(
                upstream = %upstream,
                expected = query.id(),
                received = ?header_id(datagram),
                "Discarding UDP datagram with foreign transaction id"
            );
            continue;
        }

        let message = match Message::from_vec(datagram) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    upstream = %upstream,
                    bytes = len,
                    error = %e,
                    "Discarding undecodable UDP datagram"
                );
                continue;
            }
        };
        if message.message_type() != MessageType::Response {
            tracing::debug!(upstream = %upstream, "Discarding UDP datagram that is not a response");
            continue;
        }
        if !same_question(query.queries(), message.queries()) {
            tracing::debug!(upstream = %upstream, id = query.id(), "Discarding UDP response to another question");
            continue;
        }

        return Ok(Reply {
            message,
            bytes: datagram.to_vec(),
        });
    }
}

/// Send `wire` (the encoding of `query`) over a fresh TCP connection and
/// read one response.
pub async fn exchange_tcp(
    upstream: SocketAddr,
    wire: &[u8],
    query: &Message,
) -> Result<Reply, AttemptError> {
    let mut stream = TcpStream::connect(upstream).await?;
    stream.set_nodelay(true)?;

    write_frame(&mut stream, wire).await?;
    tracing::trace!(upstream = %upstream, bytes = wire.len(), "TCP query sent");

    let bytes = read_frame(&mut stream).await?;
    let message = Message::from_vec(&bytes)?;
    if message.id() != query.id() {
        return Err(AttemptError::Mismatch {
            expected: query.id(),
            received: message.id(),
        });
    }
    if !same_question(query.queries(), message.queries()) {
        return Err(AttemptError::QuestionMismatch);
    }

    Ok(Reply { message, bytes })
}

/// Question sections match (RFC 5452 §9.1). Names compare case-insensitively.
fn same_question(sent: &[Query], received: &[Query]) -> bool {
    sent == received
}

/// Write one length-prefixed DNS message.
pub async fn write_frame<W>(writer: &mut W, message: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u16::try_from(message.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("DNS message of {} bytes exceeds TCP frame size", message.len()),
        )
    })?;

    let mut frame = Vec::with_capacity(message.len() + 2);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    writer.write_all(&frame).await?;
    writer.flush().await
}

/// Read one length-prefixed DNS message.
///
/// A clean close before the length prefix yields `UnexpectedEof`.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf).await?;

    let len = u16::from_be_bytes(len_buf) as usize;
    let mut message = vec![0u8; len];
    reader.read_exact(&mut message).await?;
    Ok(message)
}

/// Transaction ID from a raw message header.
pub fn header_id(message: &[u8]) -> Option<u16> {
    match message {
        [hi, lo, ..] if message.len() >= 12 => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}
