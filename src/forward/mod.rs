//! Forwarding of DNS queries to upstreams.
//!
//! # Data Flow
//! ```text
//! Message from middleware
//!     → forwarder.rs: pick upstream, start attempt
//!     → transport.rs: UDP exchange (TCP if truncated or client used TCP)
//!     → success: ForwardedResponse
//!     → failure: mark attempted, next upstream until attempts or deadline run out
//! ```

pub mod forwarder;
pub mod query;
pub mod transport;

pub use forwarder::{ForwardError, ForwardSettings, ForwardedResponse, Forwarder};
pub use query::InFlightQuery;
pub use transport::{AttemptError, Protocol};
