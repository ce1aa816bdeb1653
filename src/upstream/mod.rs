//! Upstream servers and the pool they are selected from.
//!
//! # Data Flow
//! ```text
//! Query arrives → forwarder asks pool.rs for an upstream
//!     → first non-excluded upstream that is not Unhealthy
//!     → else first non-excluded upstream (fallback)
//!     → else None (everything already attempted)
//! ```
//!
//! # Design Decisions
//! - Pool order is configuration order and never changes
//! - The pool is immutable; reconfiguration builds a new one
//! - Health is read through atomics, never under a lock

pub mod pool;

use std::net::SocketAddr;

use crate::config::UpstreamSpec;
use crate::health::probe::HealthEndpoint;
use crate::health::state::{HealthCell, HealthState};

pub use pool::UpstreamPool;

/// A single upstream DNS server.
#[derive(Debug)]
pub struct Upstream {
    address: SocketAddr,
    health_check: Option<HealthEndpoint>,
    health: HealthCell,
}

impl Upstream {
    /// Create an upstream. Without a health check it is permanently healthy;
    /// with one it starts Unknown until the first probe completes.
    pub fn new(spec: UpstreamSpec) -> Self {
        let initial = if spec.health_check.is_some() {
            HealthState::Unknown
        } else {
            HealthState::Healthy
        };
        Self {
            address: spec.address,
            health_check: spec.health_check,
            health: HealthCell::new(initial),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn health_check(&self) -> Option<&HealthEndpoint> {
        self.health_check.as_ref()
    }

    pub fn health(&self) -> &HealthCell {
        &self.health
    }

    pub fn state(&self) -> HealthState {
        self.health.state()
    }

    /// Return true if the upstream is considered usable (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }
}
