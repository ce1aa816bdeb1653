//! Process lifecycle: cooperative shutdown and OS signals.
//!
//! ```text
//! SIGINT / SIGTERM → main triggers Shutdown
//!     → DnsServer stops accepting and aborts in-flight query tasks
//!     → Proxy::shutdown stops the probe tasks
//! SIGHUP → main reloads the config file
//! ```
//!
//! Probe trackers use their own [`Shutdown`] so one topology can be retired
//! while the process keeps running.

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{SignalKind, Signals};
