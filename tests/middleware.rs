//! Replies the middleware produces without a real listener.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};

use dns_health_proxy::dns::{BufferSink, ProxyMiddleware, ResponseSink};
use dns_health_proxy::forward::Protocol;
use dns_health_proxy::Topology;

mod common;
use common::{closed_port, config, query, upstream, Behavior, MockDnsServer};

fn middleware(config: &dns_health_proxy::ProxyConfig) -> ProxyMiddleware {
    let topology = Topology::from_config(config).unwrap();
    ProxyMiddleware::new(Arc::new(ArcSwap::from_pointee(topology)))
}

async fn respond(middleware: &ProxyMiddleware, message: &Message) -> Message {
    let raw = message.to_vec().unwrap();
    let reply = middleware.respond(&raw, Protocol::Udp).await.unwrap();
    Message::from_vec(&reply).unwrap()
}

#[tokio::test]
async fn names_outside_from_zone_are_refused() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let mut config = config(vec![upstream(dns.addr(), None)]);
    config.proxy.from = "example.org.".to_string();
    let middleware = middleware(&config);

    let reply = respond(&middleware, &query(0x4001, "example.com.")).await;
    assert_eq!(reply.response_code(), ResponseCode::Refused);
    assert_eq!(reply.id(), 0x4001);

    let reply = respond(&middleware, &query(0x4002, "www.example.org.")).await;
    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert_eq!(dns.udp_queries(), 1);
}

#[tokio::test]
async fn except_zones_are_refused() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let mut config = config(vec![upstream(dns.addr(), None)]);
    config.proxy.except = vec!["internal.example.org.".to_string()];
    let middleware = middleware(&config);

    let reply = respond(&middleware, &query(0x4003, "db.internal.example.org.")).await;
    assert_eq!(reply.response_code(), ResponseCode::Refused);
    assert_eq!(dns.udp_queries(), 0);
}

#[tokio::test]
async fn unparseable_query_gets_formerr() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let middleware = middleware(&config(vec![upstream(dns.addr(), None)]));

    let mut raw = query(0x4004, "example.org.").to_vec().unwrap();
    raw.truncate(15);

    let reply = middleware.respond(&raw, Protocol::Udp).await.unwrap();
    let reply = Message::from_vec(&reply).unwrap();
    assert_eq!(reply.id(), 0x4004);
    assert_eq!(reply.response_code(), ResponseCode::FormErr);
    assert_eq!(dns.udp_queries(), 0);
}

#[tokio::test]
async fn input_shorter_than_a_header_is_dropped() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let middleware = middleware(&config(vec![upstream(dns.addr(), None)]));

    let mut sink = BufferSink::default();
    middleware.handle(&[0xde, 0xad, 0xbe], Protocol::Udp, &mut sink).await;
    assert!(sink.responses.is_empty());
}

#[tokio::test]
async fn forwarding_failure_becomes_servfail() {
    let dead: SocketAddr = ([127, 0, 0, 1], closed_port().await).into();
    let middleware = middleware(&config(vec![upstream(dead, None)]));

    let sent = query(0x4005, "example.org.");
    let mut sink = BufferSink::default();
    middleware
        .handle(&sent.to_vec().unwrap(), Protocol::Udp, &mut sink)
        .await;

    assert_eq!(sink.responses.len(), 1);
    let reply = Message::from_vec(&sink.responses[0]).unwrap();
    assert_eq!(reply.id(), 0x4005);
    assert_eq!(reply.response_code(), ResponseCode::ServFail);
    assert_eq!(reply.queries(), sent.queries());
}

#[tokio::test]
async fn answer_bytes_are_relayed_verbatim() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let middleware = middleware(&config(vec![upstream(dns.addr(), None)]));

    let reply = respond(&middleware, &query(0x4006, "example.org.")).await;
    assert!(reply.authoritative());
    assert_eq!(reply.answers().len(), 1);
}

struct BrokenSink;

#[async_trait]
impl ResponseSink for BrokenSink {
    async fn send(&mut self, _: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
    }
}

#[tokio::test]
async fn sink_failures_are_swallowed() {
    let dns = MockDnsServer::start(Behavior::Authoritative).await;
    let middleware = middleware(&config(vec![upstream(dns.addr(), None)]));

    let raw = query(0x4007, "example.org.").to_vec().unwrap();
    middleware.handle(&raw, Protocol::Udp, &mut BrokenSink).await;
    assert_eq!(dns.udp_queries(), 1);
}
