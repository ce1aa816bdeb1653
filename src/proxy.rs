//! Proxy runtime: the active topology and its health tracker.
//!
//! # Data Flow
//! ```text
//! ProxyConfig
//!     → validate_config
//!     → Topology { pool, forwarder, zones }
//!     → HealthTracker::start(pool)
//!     → ArcSwap<Topology> (read once per query by the middleware)
//! ```
//!
//! On reconfigure the new tracker starts before the swap and the old one is
//! stopped after it, so there is never a moment without probing.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ProxyConfig, ValidationError};
use crate::dns::{ProxyMiddleware, ZoneMatcher};
use crate::forward::{ForwardSettings, Forwarder};
use crate::health::{HealthTracker, HttpProbe, Probe, Thresholds};
use crate::upstream::UpstreamPool;

/// Everything a query needs, built from one configuration.
#[derive(Debug)]
pub struct Topology {
    forwarder: Forwarder,
    zones: ZoneMatcher,
}

impl Topology {
    pub fn new(forwarder: Forwarder, zones: ZoneMatcher) -> Self {
        Self { forwarder, zones }
    }

    /// Build a topology from a configuration that already passed validation.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let pool = Arc::new(UpstreamPool::from_config(config)?);
        let zones = ZoneMatcher::from_config(&config.proxy)
            .map_err(|e| ConfigError::from(vec![ValidationError::InvalidZone(e.zone)]))?;
        let forwarder = Forwarder::new(pool, ForwardSettings::from_config(config));
        Ok(Self::new(forwarder, zones))
    }

    pub fn pool(&self) -> &Arc<UpstreamPool> {
        self.forwarder.pool()
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn zones(&self) -> &ZoneMatcher {
        &self.zones
    }
}

/// The running proxy.
pub struct Proxy {
    topology: Arc<ArcSwap<Topology>>,
    tracker: Mutex<HealthTracker>,
    probe: Arc<dyn Probe>,
}

impl Proxy {
    /// Validate `config`, build its topology and start probing with HTTP.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(config: &ProxyConfig) -> Result<Self, ConfigError> {
        Self::with_probe(config, Arc::new(HttpProbe::new()))
    }

    /// Like [`Proxy::start`] with a custom probe implementation.
    pub fn with_probe(config: &ProxyConfig, probe: Arc<dyn Probe>) -> Result<Self, ConfigError> {
        validate_config(config)?;
        let topology = Topology::from_config(config)?;
        let tracker = HealthTracker::start(
            topology.pool(),
            probe.clone(),
            Thresholds::from(&config.health_check),
        );

        tracing::info!(
            upstreams = topology.pool().len(),
            probed = tracker.probe_count(),
            max_attempts = topology.forwarder().max_attempts(),
            "Proxy topology active"
        );

        Ok(Self {
            topology: Arc::new(ArcSwap::from_pointee(topology)),
            tracker: Mutex::new(tracker),
            probe,
        })
    }

    /// Middleware reading this proxy's topology.
    pub fn middleware(&self) -> ProxyMiddleware {
        ProxyMiddleware::new(self.topology.clone())
    }

    /// Current topology snapshot.
    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    /// Current upstream pool.
    pub fn pool(&self) -> Arc<UpstreamPool> {
        self.topology.load().pool().clone()
    }

    /// Number of probe tasks of the active tracker.
    pub async fn probe_count(&self) -> usize {
        self.tracker.lock().await.probe_count()
    }

    /// Replace the running topology with one built from `config`.
    ///
    /// On error the running topology is left untouched. Health state is not
    /// carried over: the new pool starts from its initial states.
    pub async fn reconfigure(&self, config: &ProxyConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let topology = Topology::from_config(config)?;

        let mut tracker = self.tracker.lock().await;
        let next = HealthTracker::start(
            topology.pool(),
            self.probe.clone(),
            Thresholds::from(&config.health_check),
        );
        let upstreams = topology.pool().len();

        self.topology.store(Arc::new(topology));
        let previous = std::mem::replace(&mut *tracker, next);
        previous.stop().await;

        tracing::info!(
            upstreams,
            probed = tracker.probe_count(),
            "Proxy reconfigured"
        );
        Ok(())
    }

    /// Stop all health probing.
    pub async fn shutdown(self) {
        self.tracker.into_inner().stop().await;
        tracing::info!("Proxy stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;

    fn config(upstreams: &[&str]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        config.proxy.upstreams = upstreams.iter().map(|a| UpstreamConfig::new(*a)).collect();
        config
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let result = Proxy::start(&config(&[]));
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn topology_reports_the_invalid_except_zone() {
        let bad = format!("{}.example.org.", "x".repeat(64));
        let mut config = config(&["127.0.0.1:5300"]);
        config.proxy.except = vec![bad.clone()];

        match Topology::from_config(&config) {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors, vec![ValidationError::InvalidZone(bad)]);
            }
            other => panic!("expected a zone error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_reconfigure_keeps_topology() {
        let proxy = Proxy::start(&config(&["127.0.0.1:5300"])).unwrap();

        let mut bad = config(&["127.0.0.1:5301"]);
        bad.timeouts.query_ms = 0;
        assert!(proxy.reconfigure(&bad).await.is_err());

        assert_eq!(proxy.pool().len(), 1);
        assert_eq!(
            proxy.pool().upstreams()[0].address(),
            "127.0.0.1:5300".parse().unwrap()
        );
        proxy.shutdown().await;
    }

    #[tokio::test]
    async fn reconfigure_swaps_pool() {
        let proxy = Proxy::start(&config(&["127.0.0.1:5300"])).unwrap();
        let before = proxy.topology();

        proxy
            .reconfigure(&config(&["127.0.0.1:5301", "127.0.0.1:5302"]))
            .await
            .unwrap();

        assert_eq!(proxy.pool().len(), 2);
        assert_eq!(proxy.topology().forwarder().max_attempts(), 2);
        assert_eq!(before.pool().len(), 1);
        proxy.shutdown().await;
    }
}
