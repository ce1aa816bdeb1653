//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! tracker.rs (one task per probed upstream):
//!     Periodic timer
//!     → probe.rs (HTTP GET against the health endpoint)
//!     → state.rs (hysteresis, atomic state flip)
//!
//! Query path:
//!     pool.pick() → Upstream::is_healthy() → atomic load
//! ```
//!
//! # Design Decisions
//! - Health comes only from out-of-band probes; query failures never flip state
//! - State transitions require consecutive successes/failures
//! - Health state is per-upstream, written by a single task

pub mod probe;
pub mod state;
pub mod tracker;

pub use probe::{HealthEndpoint, HealthResult, HttpProbe, Probe, ProbeError};
pub use state::{HealthCell, HealthState, Thresholds, Transition};
pub use tracker::HealthTracker;
