//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the DNS proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// The proxy block: upstreams and their health checks.
    pub proxy: ProxyBlockConfig,

    /// Health check thresholds and probe timeout.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for both UDP and TCP (e.g., "127.0.0.1:1053").
    pub bind_address: String,

    /// Maximum concurrent TCP client connections.
    pub max_tcp_connections: usize,

    /// Maximum UDP queries being handled at once.
    pub max_inflight_queries: usize,

    /// Seconds a TCP client connection may sit idle between queries.
    pub tcp_idle_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1053".to_string(),
            max_tcp_connections: 1024,
            max_inflight_queries: 4096,
            tcp_idle_secs: 10,
        }
    }
}

/// A `proxy` block: which names are forwarded and to whom.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyBlockConfig {
    /// Zone whose names are forwarded ("." forwards everything).
    pub from: String,

    /// Zones below `from` that are never forwarded.
    pub except: Vec<String>,

    /// Upstream servers in fallback order.
    pub upstreams: Vec<UpstreamConfig>,

    /// Default `health_check` directive for every upstream in the block,
    /// e.g. `"/health:8080 1s"`.
    pub health_check: Option<String>,

    /// Attempts per query; defaults to the number of upstreams.
    pub max_attempts: Option<usize>,

    /// Send queries to an unhealthy upstream when no healthy one is left.
    pub fallback_when_all_unhealthy: bool,
}

impl Default for ProxyBlockConfig {
    fn default() -> Self {
        Self {
            from: ".".to_string(),
            except: Vec::new(),
            upstreams: Vec::new(),
            health_check: None,
            max_attempts: None,
            fallback_when_all_unhealthy: true,
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "10.0.0.1:53"; the port defaults to 53).
    pub address: String,

    /// Per-upstream `health_check` directive, overriding the block default.
    #[serde(default)]
    pub health_check: Option<String>,
}

impl UpstreamConfig {
    /// An upstream with no health check of its own.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            health_check: None,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Number of consecutive failures before marking unhealthy.
    pub unhealthy_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub healthy_threshold: u32,

    /// Probe timeout in milliseconds. Unset means `min(interval, 5s)`.
    pub timeout_ms: Option<u64>,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            unhealthy_threshold: 1,
            healthy_threshold: 1,
            timeout_ms: None,
        }
    }
}

/// Timeout configuration for forwarded queries.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline for a single upstream attempt in milliseconds.
    pub attempt_ms: u64,

    /// Deadline for the whole query, across all attempts, in milliseconds.
    pub query_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt_ms: 2000,
            query_ms: 5000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9153".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_toml_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[proxy.upstreams]]
            address = "127.0.0.1:53"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:1053");
        assert_eq!(config.proxy.from, ".");
        assert!(config.proxy.fallback_when_all_unhealthy);
        assert_eq!(config.proxy.upstreams.len(), 1);
        assert!(config.proxy.upstreams[0].health_check.is_none());
        assert_eq!(config.health_check.unhealthy_threshold, 1);
        assert_eq!(config.timeouts.attempt_ms, 2000);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn full_toml_round_trips_fields() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "0.0.0.0:53"

            [proxy]
            from = "example.org."
            except = ["internal.example.org."]
            health_check = "/health:8080 1s"
            max_attempts = 2
            fallback_when_all_unhealthy = false

            [[proxy.upstreams]]
            address = "10.0.0.1"

            [[proxy.upstreams]]
            address = "10.0.0.2:5353"
            health_check = "/ready:9000"

            [health_check]
            unhealthy_threshold = 3
            timeout_ms = 250

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.proxy.except, vec!["internal.example.org."]);
        assert_eq!(config.proxy.max_attempts, Some(2));
        assert!(!config.proxy.fallback_when_all_unhealthy);
        assert_eq!(
            config.proxy.upstreams[1].health_check.as_deref(),
            Some("/ready:9000")
        );
        assert_eq!(config.health_check.unhealthy_threshold, 3);
        assert_eq!(config.health_check.healthy_threshold, 1);
        assert_eq!(config.health_check.timeout_ms, Some(250));
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
