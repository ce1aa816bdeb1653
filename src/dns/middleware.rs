//! Query handling in front of the forwarder.
//!
//! # Responsibilities
//! - Parse the inbound query, answering FORMERR when only the header is readable
//! - Refuse names outside the forwarded zones
//! - Relay the upstream answer verbatim, or truncate it for small UDP clients
//! - Turn forwarding failure into SERVFAIL

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use hickory_proto::op::{Message, MessageType, ResponseCode};

use crate::dns::response::{encode, format_error, reply_with_code, truncated_reply};
use crate::dns::sink::ResponseSink;
use crate::forward::Protocol;
use crate::observability::metrics::{self, QueryOutcome};
use crate::proxy::Topology;

/// Entry point for every query the server receives.
#[derive(Clone)]
pub struct ProxyMiddleware {
    topology: Arc<ArcSwap<Topology>>,
}

impl ProxyMiddleware {
    pub fn new(topology: Arc<ArcSwap<Topology>>) -> Self {
        Self { topology }
    }

    /// Answer `raw` and write the reply to `sink`.
    ///
    /// Nothing is written for input that is dropped. Write failures are
    /// logged, never returned.
    pub async fn handle<S>(&self, raw: &[u8], protocol: Protocol, sink: &mut S)
    where
        S: ResponseSink + ?Sized,
    {
        let Some(reply) = self.respond(raw, protocol).await else {
            return;
        };
        if let Err(e) = sink.send(&reply).await {
            tracing::warn!(protocol = %protocol, error = %e, "Failed to write DNS response");
        }
    }

    /// Build the wire reply to `raw`, or `None` if it is dropped.
    pub async fn respond(&self, raw: &[u8], protocol: Protocol) -> Option<Vec<u8>> {
        let started = Instant::now();

        let query = match Message::from_vec(raw) {
            Ok(query) => query,
            Err(e) => {
                tracing::debug!(protocol = %protocol, bytes = raw.len(), error = %e, "Unparseable query");
                let reply = format_error(raw)?;
                metrics::record_query(protocol, QueryOutcome::FormErr, started);
                return Some(reply);
            }
        };
        if query.message_type() != MessageType::Query {
            tracing::debug!(id = query.id(), "Dropping inbound message that is not a query");
            return None;
        }

        let Some(question) = query.queries().first() else {
            return self.local_reply(&query, ResponseCode::FormErr, QueryOutcome::FormErr, protocol, started);
        };

        // One snapshot per query; a concurrent reconfigure does not affect it.
        let topology = self.topology.load_full();

        if !topology.zones().matches(question.name()) {
            tracing::debug!(id = query.id(), name = %question.name(), "Name outside forwarded zones");
            return self.local_reply(&query, ResponseCode::Refused, QueryOutcome::Refused, protocol, started);
        }

        match topology.forwarder().forward(&query, protocol).await {
            Ok(response) => {
                let limit = usize::from(query.max_payload());
                if protocol == Protocol::Udp && response.bytes.len() > limit {
                    tracing::debug!(
                        id = query.id(),
                        size = response.bytes.len(),
                        limit,
                        "Answer exceeds client payload size, truncating"
                    );
                    let reply = truncated_reply(&query, &response.message);
                    return self.encode_reply(&reply, QueryOutcome::Truncated, protocol, started);
                }

                metrics::record_query(protocol, QueryOutcome::Answered, started);
                Some(response.bytes)
            }
            Err(e) => {
                tracing::warn!(
                    id = query.id(),
                    name = %question.name(),
                    qtype = %question.query_type(),
                    error = %e,
                    "Forwarding failed, answering SERVFAIL"
                );
                self.local_reply(&query, ResponseCode::ServFail, QueryOutcome::ServFail, protocol, started)
            }
        }
    }

    fn local_reply(
        &self,
        query: &Message,
        code: ResponseCode,
        outcome: QueryOutcome,
        protocol: Protocol,
        started: Instant,
    ) -> Option<Vec<u8>> {
        self.encode_reply(&reply_with_code(query, code), outcome, protocol, started)
    }

    fn encode_reply(
        &self,
        reply: &Message,
        outcome: QueryOutcome,
        protocol: Protocol,
        started: Instant,
    ) -> Option<Vec<u8>> {
        match encode(reply) {
            Ok(bytes) => {
                metrics::record_query(protocol, outcome, started);
                Some(bytes)
            }
            Err(e) => {
                tracing::error!(id = reply.id(), error = %e, "Failed to encode reply");
                None
            }
        }
    }
}
