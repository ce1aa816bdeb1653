//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Parse upstream addresses and `health_check` directives
//! - Validate value ranges (timeouts > 0, thresholds > 0, ports valid)
//! - Detect duplicate upstreams
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_proto::rr::Name;
use thiserror::Error;

use crate::config::directive::{parse_upstream_address, DirectiveError, HealthCheckDirective};
use crate::config::schema::ProxyConfig;
use crate::health::probe::HealthEndpoint;

/// Upper bound applied to the default probe timeout.
const MAX_DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("proxy block has no upstreams")]
    NoUpstreams,
    #[error("invalid bind address `{0}`")]
    InvalidBindAddress(String),
    #[error("invalid metrics address `{0}`")]
    InvalidMetricsAddress(String),
    #[error("upstream `{address}`: {source}")]
    InvalidUpstream {
        address: String,
        source: DirectiveError,
    },
    #[error("upstream {0} is listed more than once")]
    DuplicateUpstream(SocketAddr),
    #[error("health_check for `{upstream}`: {source}")]
    InvalidHealthCheck {
        upstream: String,
        source: DirectiveError,
    },
    #[error("`{0}` is not a valid zone name")]
    InvalidZone(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// An upstream after its address and health check have been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamSpec {
    pub address: SocketAddr,
    pub health_check: Option<HealthEndpoint>,
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_tcp_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_tcp_connections"));
    }
    if config.listener.max_inflight_queries == 0 {
        errors.push(ValidationError::Zero("listener.max_inflight_queries"));
    }
    if config.listener.tcp_idle_secs == 0 {
        errors.push(ValidationError::Zero("listener.tcp_idle_secs"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    errors.extend(check_forwarding(config));

    if let Err(upstream_errors) = resolve_upstreams(config) {
        errors.extend(upstream_errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Problems with zones, thresholds and timeouts of the proxy block.
fn check_forwarding(config: &ProxyConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for zone in std::iter::once(&config.proxy.from).chain(config.proxy.except.iter()) {
        if Name::from_ascii(zone).is_err() {
            errors.push(ValidationError::InvalidZone(zone.clone()));
        }
    }

    if config.proxy.max_attempts == Some(0) {
        errors.push(ValidationError::Zero("proxy.max_attempts"));
    }
    if config.health_check.unhealthy_threshold == 0 {
        errors.push(ValidationError::Zero("health_check.unhealthy_threshold"));
    }
    if config.health_check.healthy_threshold == 0 {
        errors.push(ValidationError::Zero("health_check.healthy_threshold"));
    }
    if config.health_check.timeout_ms == Some(0) {
        errors.push(ValidationError::Zero("health_check.timeout_ms"));
    }
    if config.timeouts.attempt_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.attempt_ms"));
    }
    if config.timeouts.query_ms == 0 {
        errors.push(ValidationError::Zero("timeouts.query_ms"));
    }

    errors
}

/// Resolve the configured upstreams into addresses and health endpoints.
///
/// A per-upstream `health_check` overrides the block default.
pub fn resolve_upstreams(config: &ProxyConfig) -> Result<Vec<UpstreamSpec>, Vec<ValidationError>> {
    let block = &config.proxy;
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(block.upstreams.len());

    if block.upstreams.is_empty() {
        errors.push(ValidationError::NoUpstreams);
    }

    for upstream in &block.upstreams {
        let address = match parse_upstream_address(&upstream.address) {
            Ok(addr) => addr,
            Err(source) => {
                errors.push(ValidationError::InvalidUpstream {
                    address: upstream.address.clone(),
                    source,
                });
                continue;
            }
        };
        if !seen.insert(address) {
            errors.push(ValidationError::DuplicateUpstream(address));
            continue;
        }

        let directive = upstream
            .health_check
            .as_deref()
            .or(block.health_check.as_deref());
        let health_check = match directive.map(HealthCheckDirective::parse) {
            None => None,
            Some(Ok(directive)) => Some(endpoint_for(address, directive, config)),
            Some(Err(source)) => {
                errors.push(ValidationError::InvalidHealthCheck {
                    upstream: upstream.address.clone(),
                    source,
                });
                continue;
            }
        };

        specs.push(UpstreamSpec {
            address,
            health_check,
        });
    }

    if errors.is_empty() {
        Ok(specs)
    } else {
        Err(errors)
    }
}

fn endpoint_for(
    address: SocketAddr,
    directive: HealthCheckDirective,
    config: &ProxyConfig,
) -> HealthEndpoint {
    let timeout = config
        .health_check
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| directive.interval.min(MAX_DEFAULT_PROBE_TIMEOUT));

    HealthEndpoint {
        host: address.ip(),
        port: directive.port,
        path: directive.path,
        interval: directive.interval,
        timeout,
    }
}
