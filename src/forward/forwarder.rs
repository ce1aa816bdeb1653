//! Query forwarding with failover.
//!
//! # Responsibilities
//! - Pick an upstream per attempt, never the same one twice for a query
//! - Bound every attempt by `min(attempt_timeout, time left for the query)`
//! - Retry a truncated UDP answer over TCP against the same upstream
//! - Leave health state alone: only the probe tasks change it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::op::Message;
use thiserror::Error;
use tokio::time;

use crate::config::ProxyConfig;
use crate::forward::query::InFlightQuery;
use crate::forward::transport::{exchange_tcp, exchange_udp, AttemptError, Protocol, Reply};
use crate::observability::metrics;
use crate::upstream::UpstreamPool;

/// Timing and retry limits of a forwarder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardSettings {
    pub attempt_timeout: Duration,
    pub query_timeout: Duration,
    /// `None` means one attempt per upstream.
    pub max_attempts: Option<usize>,
}

impl ForwardSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            attempt_timeout: Duration::from_millis(config.timeouts.attempt_ms),
            query_timeout: Duration::from_millis(config.timeouts.query_ms),
            max_attempts: config.proxy.max_attempts,
        }
    }
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(2),
            query_timeout: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// A successful exchange.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    pub message: Message,
    /// Upstream response exactly as received.
    pub bytes: Vec<u8>,
    pub upstream: SocketAddr,
    /// Transport the answer finally arrived on.
    pub protocol: Protocol,
    pub attempts: usize,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("no upstream answered after {attempts} attempt(s)")]
    Unreachable { attempts: usize },
    #[error("failed to encode query: {0}")]
    Encode(String),
}

/// Sends queries to the upstreams of one pool.
#[derive(Debug)]
pub struct Forwarder {
    pool: Arc<UpstreamPool>,
    settings: ForwardSettings,
}

impl Forwarder {
    pub fn new(pool: Arc<UpstreamPool>, settings: ForwardSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &Arc<UpstreamPool> {
        &self.pool
    }

    /// Attempts allowed per query.
    pub fn max_attempts(&self) -> usize {
        self.settings.max_attempts.unwrap_or(self.pool.len()).max(1)
    }

    /// Forward `query`, failing over between upstreams until one answers,
    /// attempts run out or the query deadline passes.
    pub async fn forward(
        &self,
        query: &Message,
        protocol: Protocol,
    ) -> Result<ForwardedResponse, ForwardError> {
        let wire = query
            .to_vec()
            .map_err(|e| ForwardError::Encode(e.to_string()))?;

        let mut inflight = InFlightQuery::new(query.id(), self.settings.query_timeout);
        let max_attempts = self.max_attempts();

        while inflight.attempts() < max_attempts {
            let Some(remaining) = inflight.remaining() else {
                tracing::debug!(id = inflight.query_id(), "Query deadline passed");
                break;
            };
            let Some(upstream) = self.pool.pick(inflight.attempted()) else {
                tracing::debug!(
                    id = inflight.query_id(),
                    attempted = inflight.attempted().len(),
                    "No upstream left to try"
                );
                break;
            };

            let address = upstream.address();
            inflight.begin_attempt(address);
            let budget = self.settings.attempt_timeout.min(remaining);

            let outcome = time::timeout(
                budget,
                self.attempt(address, &wire, query, protocol),
            )
            .await
            .unwrap_or(Err(AttemptError::Timeout));

            match outcome {
                Ok((reply, answered_over)) => {
                    tracing::debug!(
                        id = inflight.query_id(),
                        upstream = %address,
                        protocol = %answered_over,
                        attempts = inflight.attempts(),
                        rcode = ?reply.message.response_code(),
                        "Upstream answered"
                    );
                    return Ok(ForwardedResponse {
                        message: reply.message,
                        bytes: reply.bytes,
                        upstream: address,
                        protocol: answered_over,
                        attempts: inflight.attempts(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        id = inflight.query_id(),
                        upstream = %address,
                        attempt = inflight.attempts(),
                        budget_ms = budget.as_millis() as u64,
                        error = %error,
                        "Forward attempt failed"
                    );
                    metrics::record_attempt_failure(address, error.kind());
                }
            }
        }

        Err(ForwardError::Unreachable {
            attempts: inflight.attempts(),
        })
    }

    async fn attempt(
        &self,
        upstream: SocketAddr,
        wire: &[u8],
        query: &Message,
        protocol: Protocol,
    ) -> Result<(Reply, Protocol), AttemptError> {
        if protocol == Protocol::Tcp {
            return Ok((exchange_tcp(upstream, wire, query).await?, Protocol::Tcp));
        }

        let reply = exchange_udp(upstream, wire, query).await?;
        if !reply.message.truncated() {
            return Ok((reply, Protocol::Udp));
        }

        tracing::debug!(upstream = %upstream, id = query.id(), "Truncated UDP answer, retrying over TCP");
        Ok((exchange_tcp(upstream, wire, query).await?, Protocol::Tcp))
    }
}
