//! Upstream pool and selection.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::validation::resolve_upstreams;
use crate::config::{ConfigError, ProxyConfig, UpstreamSpec};
use crate::observability::metrics;
use crate::upstream::Upstream;

/// Ordered, immutable set of upstreams.
#[derive(Debug)]
pub struct UpstreamPool {
    upstreams: Vec<Arc<Upstream>>,
    fallback_when_all_unhealthy: bool,
}

impl UpstreamPool {
    /// Build a pool from resolved upstreams, keeping their order.
    pub fn new(specs: Vec<UpstreamSpec>, fallback_when_all_unhealthy: bool) -> Self {
        Self {
            upstreams: specs.into_iter().map(|s| Arc::new(Upstream::new(s))).collect(),
            fallback_when_all_unhealthy,
        }
    }

    /// Build a pool from the `proxy` block of a configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let specs = resolve_upstreams(config)?;
        Ok(Self::new(specs, config.proxy.fallback_when_all_unhealthy))
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }

    pub fn get(&self, address: SocketAddr) -> Option<&Arc<Upstream>> {
        self.upstreams.iter().find(|u| u.address() == address)
    }

    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }

    /// Select an upstream that has not been tried yet.
    ///
    /// Prefers the first usable upstream in configuration order. When every
    /// candidate is Unhealthy the first candidate is returned anyway, unless
    /// the fallback is disabled. `None` means no candidate is left.
    pub fn pick(&self, excluding: &HashSet<SocketAddr>) -> Option<Arc<Upstream>> {
        let mut fallback = None;

        for upstream in &self.upstreams {
            if excluding.contains(&upstream.address()) {
                continue;
            }
            if upstream.is_healthy() {
                return Some(upstream.clone());
            }
            if fallback.is_none() {
                fallback = Some(upstream);
            }
        }

        let upstream = fallback?;
        if !self.fallback_when_all_unhealthy {
            tracing::debug!(
                excluded = excluding.len(),
                "All remaining upstreams unhealthy and fallback disabled"
            );
            return None;
        }

        tracing::debug!(
            upstream = %upstream.address(),
            "All remaining upstreams unhealthy, falling back"
        );
        metrics::record_fallback_pick();
        Some(upstream.clone())
    }
}
