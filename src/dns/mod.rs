//! DNS-facing side of the proxy.
//!
//! # Data Flow
//! ```text
//! raw query from net::server
//!     → middleware.rs: parse, zone check (zone.rs)
//!     → forward::Forwarder
//!     → response.rs builds SERVFAIL / REFUSED / FORMERR / TC replies
//!     → sink.rs writes the reply back to the client
//! ```

pub mod middleware;
pub mod response;
pub mod sink;
pub mod zone;

pub use middleware::ProxyMiddleware;
pub use sink::{BufferSink, ResponseSink, TcpSink, UdpSink};
pub use zone::{ZoneError, ZoneMatcher};
