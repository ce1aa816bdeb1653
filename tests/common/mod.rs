//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use dns_health_proxy::config::{ProxyConfig, UpstreamConfig};
use dns_health_proxy::forward::transport::{read_frame, write_frame};
use dns_health_proxy::{DnsServer, Proxy, Shutdown};

/// How a [`MockDnsServer`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// One A record `127.0.0.1` for the queried name.
    Authoritative,
    /// Empty TC reply over UDP, full answer over TCP.
    TruncateUdp,
    /// Never answers.
    Silent,
    /// Sends a reply with the wrong transaction id before the real one.
    WrongIdFirst,
    /// Forty A records, too large for a plain 512-byte UDP client.
    Large,
    /// Four hundred A records in one datagram, beyond 4096 bytes.
    Huge,
    /// Sends an undecodable datagram with the right id before the real reply.
    GarbageFirst,
    /// Answers another name under the right id before the real reply.
    OtherQuestionFirst,
}

/// Authoritative DNS server stand-in listening on UDP and TCP.
pub struct MockDnsServer {
    addr: SocketAddr,
    udp_queries: Arc<AtomicUsize>,
    tcp_queries: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockDnsServer {
    pub async fn start(behavior: Behavior) -> Self {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = udp.local_addr().unwrap();
        let tcp = TcpListener::bind(addr).await.unwrap();

        let udp_queries = Arc::new(AtomicUsize::new(0));
        let tcp_queries = Arc::new(AtomicUsize::new(0));

        let udp_task = {
            let counter = udp_queries.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    let Ok((len, peer)) = udp.recv_from(&mut buf).await else {
                        break;
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let Ok(query) = Message::from_vec(&buf[..len]) else {
                        continue;
                    };

                    let replies = match behavior {
                        Behavior::Silent => continue,
                        Behavior::Authoritative => vec![answer(&query, 1)],
                        Behavior::Large => vec![answer(&query, 40)],
                        Behavior::Huge => vec![answer(&query, 400)],
                        Behavior::GarbageFirst => {
                            // QR set, QDCOUNT=1, but no question follows.
                            let mut header = [0u8; 12];
                            header[..2].copy_from_slice(&query.id().to_be_bytes());
                            header[2] = 0x80;
                            header[5] = 1;
                            let _ = udp.send_to(&header, peer).await;
                            vec![answer(&query, 1)]
                        }
                        Behavior::OtherQuestionFirst => {
                            let mut decoy = query.clone();
                            decoy.take_queries();
                            decoy.add_query(Query::query(
                                Name::from_ascii("decoy.test.").unwrap(),
                                RecordType::A,
                            ));
                            let mut spoofed = answer(&decoy, 1);
                            spoofed.set_id(query.id());
                            vec![spoofed, answer(&query, 1)]
                        }
                        Behavior::TruncateUdp => {
                            let mut reply = answer(&query, 0);
                            reply.set_truncated(true);
                            vec![reply]
                        }
                        Behavior::WrongIdFirst => {
                            let mut stray = answer(&query, 1);
                            stray.set_id(query.id().wrapping_add(1));
                            vec![stray, answer(&query, 1)]
                        }
                    };
                    for reply in replies {
                        let _ = udp.send_to(&reply.to_vec().unwrap(), peer).await;
                    }
                }
            })
        };

        let tcp_task = {
            let counter = tcp_queries.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = tcp.accept().await {
                    let counter = counter.clone();
                    tokio::spawn(serve_tcp(stream, behavior, counter));
                }
            })
        };

        Self {
            addr,
            udp_queries,
            tcp_queries,
            tasks: vec![udp_task, tcp_task],
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn udp_queries(&self) -> usize {
        self.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.tcp_queries.load(Ordering::SeqCst)
    }
}

impl Drop for MockDnsServer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_tcp(mut stream: TcpStream, behavior: Behavior, counter: Arc<AtomicUsize>) {
    while let Ok(frame) = read_frame(&mut stream).await {
        counter.fetch_add(1, Ordering::SeqCst);
        let Ok(query) = Message::from_vec(&frame) else {
            continue;
        };
        let reply = match behavior {
            Behavior::Silent => continue,
            Behavior::Large => answer(&query, 40),
            Behavior::Huge => answer(&query, 400),
            _ => answer(&query, 1),
        };
        if write_frame(&mut stream, &reply.to_vec().unwrap()).await.is_err() {
            break;
        }
    }
}

/// NOERROR reply with `count` A records 127.0.0.1, 127.0.0.2, ...
fn answer(query: &Message, count: u32) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(query.id())
        .set_message_type(MessageType::Response)
        .set_op_code(query.op_code())
        .set_authoritative(true)
        .set_recursion_desired(query.recursion_desired())
        .set_response_code(ResponseCode::NoError)
        .add_queries(query.queries().iter().cloned());

    if let Some(question) = query.queries().first() {
        for i in 0..count {
            reply.add_answer(Record::from_rdata(
                question.name().clone(),
                60,
                RData::A(A::from(Ipv4Addr::from(0x7f00_0001 + i))),
            ));
        }
    }
    reply
}

/// HTTP health endpoint with a switchable status code.
pub struct MockHealthEndpoint {
    addr: SocketAddr,
    status: Arc<AtomicU16>,
    hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockHealthEndpoint {
    pub async fn start(status: u16) -> Self {
        Self::spawn(status, false).await
    }

    /// Accepts connections but never answers.
    pub async fn hanging() -> Self {
        Self::spawn(200, true).await
    }

    async fn spawn(status: u16, hang: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let status = Arc::new(AtomicU16::new(status));
        let hits = Arc::new(AtomicUsize::new(0));

        let task = {
            let status = status.clone();
            let hits = hits.clone();
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let status = status.load(Ordering::SeqCst);
                    let hits = hits.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        hits.fetch_add(1, Ordering::SeqCst);
                        if hang {
                            time::sleep(Duration::from_secs(3600)).await;
                            return;
                        }
                        let status_text = match status {
                            200 => "200 OK",
                            204 => "204 No Content",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "404 Not Found",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok",
                            status_text
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
            })
        };

        Self {
            addr,
            status,
            hits,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockHealthEndpoint {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// A port nothing listens on (for UDP and TCP alike, barring races).
pub async fn closed_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.local_addr().unwrap().port()
}

/// A recursive A query for `name`.
pub fn query(id: u16, name: &str) -> Message {
    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(Name::from_ascii(name).unwrap(), RecordType::A));
    message
}

pub async fn query_udp(server: SocketAddr, message: &Message) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&message.to_vec().unwrap(), server).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .expect("no UDP reply from proxy")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

pub async fn query_tcp(server: SocketAddr, message: &Message) -> Message {
    let mut stream = TcpStream::connect(server).await.unwrap();
    write_frame(&mut stream, &message.to_vec().unwrap()).await.unwrap();
    let frame = time::timeout(Duration::from_secs(5), read_frame(&mut stream))
        .await
        .expect("no TCP reply from proxy")
        .unwrap();
    Message::from_vec(&frame).unwrap()
}

/// First A record of an answer.
pub fn first_a(message: &Message) -> Option<std::net::Ipv4Addr> {
    message.answers().iter().find_map(|record| match record.data() {
        Some(RData::A(a)) => Some(a.0),
        _ => None,
    })
}

/// An upstream, probed every 100ms when `health_port` is set.
pub fn upstream(addr: SocketAddr, health_port: Option<u16>) -> UpstreamConfig {
    UpstreamConfig {
        address: addr.to_string(),
        health_check: health_port.map(|port| format!("/health:{port} 100ms")),
    }
}

/// Proxy configuration on an ephemeral port with short timeouts.
pub fn config(upstreams: Vec<UpstreamConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.proxy.upstreams = upstreams;
    config.health_check.timeout_ms = Some(500);
    config.timeouts.attempt_ms = 500;
    config.timeouts.query_ms = 2000;
    config
}

/// A proxy serving on a real socket.
pub struct TestProxy {
    pub proxy: Proxy,
    pub addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl TestProxy {
    pub async fn start(config: &ProxyConfig) -> Self {
        let proxy = Proxy::start(config).unwrap();
        let server = DnsServer::bind(&config.listener).await.unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let task = tokio::spawn(server.run(proxy.middleware(), shutdown.subscribe()));

        Self {
            proxy,
            addr,
            shutdown,
            task,
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = self.task.await;
        self.proxy.shutdown().await;
    }
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_for<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
