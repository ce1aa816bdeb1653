//! Active health checking.
//!
//! # Responsibilities
//! - Run one periodic probe task per upstream that has a health check
//! - Apply probe results to the upstream's health cell
//! - Keep reporting the health gauge of every upstream of the pool
//! - Stop every task on demand
//!
//! Each task awaits its probe inline, so probes of one upstream never
//! overlap; missed ticks are skipped rather than bunched up.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::health::probe::{HealthEndpoint, HealthResult, Probe, ProbeError};
use crate::health::state::{HealthState, Thresholds};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::metrics;
use crate::upstream::{Upstream, UpstreamPool};

/// Owner of the probe tasks of one pool.
pub struct HealthTracker {
    tasks: Vec<JoinHandle<()>>,
    reporter: JoinHandle<()>,
    stop: Shutdown,
}

impl HealthTracker {
    /// Spawn a probe task for every upstream of `pool` with a health check.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(pool: &UpstreamPool, probe: Arc<dyn Probe>, thresholds: Thresholds) -> Self {
        let stop = Shutdown::new();
        let mut tasks = Vec::new();

        for upstream in pool.upstreams() {
            let Some(endpoint) = upstream.health_check().cloned() else {
                continue;
            };

            tasks.push(tokio::spawn(probe_loop(
                upstream.clone(),
                endpoint,
                probe.clone(),
                thresholds,
                stop.subscribe(),
            )));
        }

        tracing::info!(
            upstreams = pool.len(),
            probed = tasks.len(),
            unhealthy_threshold = thresholds.unhealthy,
            healthy_threshold = thresholds.healthy,
            "Health tracker started"
        );

        let reporter = tokio::spawn(report_loop(pool.upstreams().to_vec(), stop.subscribe()));

        Self {
            tasks,
            reporter,
            stop,
        }
    }

    /// Number of probe tasks started.
    pub fn probe_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel all probe tasks and health reporting and wait for them to finish.
    pub async fn stop(self) {
        self.stop.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        let _ = self.reporter.await;
        tracing::debug!("Health tracker stopped");
    }
}

async fn probe_loop(
    upstream: Arc<Upstream>,
    endpoint: HealthEndpoint,
    probe: Arc<dyn Probe>,
    thresholds: Thresholds,
    mut stop: ShutdownSignal,
) {
    tracing::debug!(
        upstream = %upstream.address(),
        url = %endpoint.url(),
        interval = ?endpoint.interval,
        "Probe loop starting"
    );

    let mut ticker = time::interval(endpoint.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.recv() => break,
        }

        // The probe is expected to honour the timeout; bound it here as well.
        let result = tokio::select! {
            outcome = time::timeout(endpoint.timeout, probe.probe(&endpoint, endpoint.timeout)) => {
                outcome.unwrap_or_else(|_| {
                    HealthResult::failure(endpoint.timeout, ProbeError::Timeout(endpoint.timeout))
                })
            }
            _ = stop.recv() => break,
        };

        apply(&upstream, &result, &thresholds);
    }

    tracing::debug!(upstream = %upstream.address(), "Probe loop stopped");
}

async fn report_loop(upstreams: Vec<Arc<Upstream>>, mut stop: ShutdownSignal) {
    let mut ticker = time::interval(metrics::HEALTH_REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => report_health(&upstreams),
            _ = stop.recv() => break,
        }
    }
}

fn report_health(upstreams: &[Arc<Upstream>]) {
    for upstream in upstreams {
        metrics::record_upstream_health(upstream.address(), upstream.state());
    }
}

fn apply(upstream: &Upstream, result: &HealthResult, thresholds: &Thresholds) {
    let addr = upstream.address();
    let latency_ms = result.latency.as_millis() as u64;

    match &result.error {
        Some(error) => tracing::debug!(upstream = %addr, latency_ms, error = %error, "Health probe failed"),
        None => tracing::trace!(upstream = %addr, latency_ms, "Health probe succeeded"),
    }

    let Some(transition) = upstream.health().record(result.ok, thresholds) else {
        return;
    };

    match transition.to {
        HealthState::Healthy => tracing::info!(
            upstream = %addr,
            from = %transition.from,
            "Upstream marked healthy"
        ),
        HealthState::Unhealthy => tracing::warn!(
            upstream = %addr,
            from = %transition.from,
            failures = upstream.health().consecutive_failures(),
            "Upstream marked unhealthy"
        ),
        HealthState::Unknown => {}
    }
    metrics::record_upstream_health(addr, transition.to);
}
