//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! UDP datagram ─┐
//!               ├→ server.rs (limits, per-query task) → dns::ProxyMiddleware
//! TCP stream  ──┘   (length-prefixed messages, idle timeout)
//! ```

pub mod server;

pub use server::{DnsServer, ServerError};
