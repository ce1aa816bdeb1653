//! Configuration: TOML schema, `health_check` directives, validation and
//! hot reload.
//!
//! # Data Flow
//! ```text
//! dns-proxy.toml
//!     → loader.rs: toml → ProxyConfig
//!     → validation.rs: every semantic problem collected at once;
//!       directive.rs turns "/health:8080 1s" into a probe endpoint
//!     → UpstreamSpec list, consumed by upstream::UpstreamPool
//!
//! watcher.rs (file change) or SIGHUP
//!     → reload through loader.rs
//!     → proxy::Proxy::reconfigure, or the running topology stays on error
//! ```
//!
//! Every section and field has a default, so a file naming only its
//! upstreams is a complete configuration.

pub mod directive;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    HealthCheckConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyBlockConfig,
    ProxyConfig, TimeoutConfig, UpstreamConfig,
};
pub use validation::{UpstreamSpec, ValidationError};
