//! Per-query forwarding state.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::time::Instant;

/// Bookkeeping for one query while it is being forwarded.
#[derive(Debug)]
pub struct InFlightQuery {
    query_id: u16,
    deadline: Instant,
    attempted: HashSet<SocketAddr>,
    attempts: usize,
}

impl InFlightQuery {
    /// Start tracking a query that must be answered within `timeout`.
    pub fn new(query_id: u16, timeout: Duration) -> Self {
        Self {
            query_id,
            deadline: Instant::now() + timeout,
            attempted: HashSet::new(),
            attempts: 0,
        }
    }

    pub fn query_id(&self) -> u16 {
        self.query_id
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let left = self.deadline.saturating_duration_since(Instant::now());
        (!left.is_zero()).then_some(left)
    }

    /// Upstreams already tried for this query.
    pub fn attempted(&self) -> &HashSet<SocketAddr> {
        &self.attempted
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Record that `upstream` is being tried.
    pub fn begin_attempt(&mut self, upstream: SocketAddr) {
        self.attempts += 1;
        self.attempted.insert(upstream);
    }
}
