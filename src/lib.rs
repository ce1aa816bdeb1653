//! DNS forwarding proxy with out-of-band HTTP health checks.
//!
//! ```text
//!   client ──UDP/TCP──▶ net::DnsServer ──▶ dns::ProxyMiddleware ──▶ forward::Forwarder
//!                                                                        │
//!                                                  upstream::UpstreamPool::pick()
//!                                                                        │
//!                                   health::HealthTracker ──probes──▶ upstream health cells
//! ```
//!
//! [`Proxy`] owns the active [`proxy::Topology`] and its health tracker and
//! swaps both on reconfiguration.

pub mod config;
pub mod dns;
pub mod forward;
pub mod health;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use dns::ProxyMiddleware;
pub use forward::{ForwardError, Forwarder, Protocol};
pub use lifecycle::Shutdown;
pub use net::DnsServer;
pub use proxy::{Proxy, Topology};
pub use upstream::{Upstream, UpstreamPool};
