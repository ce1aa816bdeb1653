//! OS signal handling.
//!
//! SIGINT and SIGTERM request shutdown; SIGHUP requests a configuration
//! reload. Non-unix targets only see Ctrl+C.

use std::io;

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Terminate,
    Reload,
}

/// Registered signal handlers.
pub struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl Signals {
    /// Install the handlers. Must be called inside a Tokio runtime.
    pub fn new() -> io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind as UnixSignal};
            Ok(Self {
                terminate: signal(UnixSignal::terminate())?,
                hangup: signal(UnixSignal::hangup())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    /// Wait for the next signal.
    pub async fn recv(&mut self) -> SignalKind {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => SignalKind::Terminate,
                _ = self.terminate.recv() => SignalKind::Terminate,
                _ = self.hangup.recv() => SignalKind::Reload,
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            SignalKind::Terminate
        }
    }
}
