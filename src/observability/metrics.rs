//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dns_proxy_queries_total` (counter): queries by protocol and outcome
//! - `dns_proxy_query_duration_seconds` (histogram): end-to-end query latency
//! - `dns_proxy_attempt_failures_total` (counter): failed attempts by upstream, reason
//! - `dns_proxy_fallback_picks_total` (counter): unhealthy upstreams picked as last resort
//! - `dns_proxy_upstream_health` (gauge): 1=healthy, 0.5=unknown, 0=unhealthy
//!
//! Recording is a no-op until a recorder is installed, so the query path
//! never checks whether metrics are enabled.
//!
//! Health gauges are re-reported every [`HEALTH_REPORT_INTERVAL`] by the
//! tracker owning the upstream. A gauge nobody reports for
//! [`GAUGE_IDLE_TIMEOUT`] is dropped, so upstreams removed by a reload stop
//! being exported.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use metrics_util::MetricKindMask;

use crate::forward::Protocol;
use crate::health::HealthState;

pub const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(15);

pub const GAUGE_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .idle_timeout(MetricKindMask::GAUGE, Some(GAUGE_IDLE_TIMEOUT))
        .install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// How a client query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    Answered,
    Truncated,
    Refused,
    FormErr,
    ServFail,
}

impl QueryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryOutcome::Answered => "answered",
            QueryOutcome::Truncated => "truncated",
            QueryOutcome::Refused => "refused",
            QueryOutcome::FormErr => "formerr",
            QueryOutcome::ServFail => "servfail",
        }
    }
}

pub fn record_query(protocol: Protocol, outcome: QueryOutcome, started: Instant) {
    let protocol = match protocol {
        Protocol::Udp => "udp",
        Protocol::Tcp => "tcp",
    };
    ::metrics::counter!(
        "dns_proxy_queries_total",
        "protocol" => protocol,
        "outcome" => outcome.as_str()
    )
    .increment(1);
    ::metrics::histogram!("dns_proxy_query_duration_seconds", "protocol" => protocol)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt_failure(upstream: SocketAddr, reason: &'static str) {
    ::metrics::counter!(
        "dns_proxy_attempt_failures_total",
        "upstream" => upstream.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_fallback_pick() {
    ::metrics::counter!("dns_proxy_fallback_picks_total").increment(1);
}

pub fn record_upstream_health(upstream: SocketAddr, state: HealthState) {
    let value = match state {
        HealthState::Healthy => 1.0,
        HealthState::Unknown => 0.5,
        HealthState::Unhealthy => 0.0,
    };
    ::metrics::gauge!("dns_proxy_upstream_health", "upstream" => upstream.to_string()).set(value);
}
