//! Upstream health state machine.
//!
//! # States
//! - Unknown: not probed yet, still receives traffic
//! - Healthy: upstream receives traffic
//! - Unhealthy: upstream skipped while a usable one exists
//!
//! # State Transitions
//! ```text
//! Unknown/Healthy   → Unhealthy: consecutive failures  >= unhealthy threshold
//! Unknown/Unhealthy → Healthy:   consecutive successes >= healthy threshold
//! ```
//!
//! Every cell has exactly one writer (its probe task); readers on the query
//! path only perform atomic loads.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::HealthCheckConfig;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// Consecutive results needed before a state flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub unhealthy: u32,
    pub healthy: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            unhealthy: 1,
            healthy: 1,
        }
    }
}

impl From<&HealthCheckConfig> for Thresholds {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            unhealthy: config.unhealthy_threshold.max(1),
            healthy: config.healthy_threshold.max(1),
        }
    }
}

/// A state change caused by a probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HealthState,
    pub to: HealthState,
}

/// Lock-free health record of one upstream.
#[derive(Debug)]
pub struct HealthCell {
    state: AtomicU8,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    /// Milliseconds since the Unix epoch; 0 = never probed.
    last_probe_ms: AtomicU64,
}

impl HealthCell {
    pub fn new(initial: HealthState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            last_probe_ms: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Healthy or Unknown.
    pub fn is_healthy(&self) -> bool {
        self.state() != HealthState::Unhealthy
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn consecutive_successes(&self) -> u32 {
        self.consecutive_successes.load(Ordering::Relaxed)
    }

    /// Time of the most recent probe, if any.
    pub fn last_probe(&self) -> Option<SystemTime> {
        match self.last_probe_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Apply one probe result. Returns the transition if the state flipped.
    pub(crate) fn record(&self, ok: bool, thresholds: &Thresholds) -> Option<Transition> {
        self.touch();

        let (reset, count, threshold, target) = if ok {
            (
                &self.consecutive_failures,
                &self.consecutive_successes,
                thresholds.healthy,
                HealthState::Healthy,
            )
        } else {
            (
                &self.consecutive_successes,
                &self.consecutive_failures,
                thresholds.unhealthy,
                HealthState::Unhealthy,
            )
        };

        reset.store(0, Ordering::Relaxed);
        // Single writer: load + store cannot lose an update.
        let streak = count.load(Ordering::Relaxed).saturating_add(1);
        count.store(streak, Ordering::Relaxed);

        let current = self.state();
        if current == target || streak < threshold {
            return None;
        }

        self.state.store(target as u8, Ordering::Relaxed);
        Some(Transition {
            from: current,
            to: target,
        })
    }

    fn touch(&self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1)
            .max(1);
        self.last_probe_ms.store(now_ms, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_counts_as_healthy() {
        let cell = HealthCell::new(HealthState::Unknown);
        assert!(cell.is_healthy());
        assert!(cell.last_probe().is_none());
    }

    #[test]
    fn single_success_marks_healthy_by_default() {
        let cell = HealthCell::new(HealthState::Unknown);
        let t = cell.record(true, &Thresholds::default());
        assert_eq!(
            t,
            Some(Transition {
                from: HealthState::Unknown,
                to: HealthState::Healthy
            })
        );
        assert!(cell.last_probe().is_some());
    }

    #[test]
    fn failures_need_threshold() {
        let thresholds = Thresholds {
            unhealthy: 3,
            healthy: 1,
        };
        let cell = HealthCell::new(HealthState::Healthy);

        assert_eq!(cell.record(false, &thresholds), None);
        assert_eq!(cell.record(false, &thresholds), None);
        assert_eq!(cell.state(), HealthState::Healthy);
        assert_eq!(cell.consecutive_failures(), 2);

        let t = cell.record(false, &thresholds).unwrap();
        assert_eq!(t.from, HealthState::Healthy);
        assert_eq!(t.to, HealthState::Unhealthy);
        assert!(!cell.is_healthy());
    }

    #[test]
    fn success_resets_failure_streak() {
        let thresholds = Thresholds {
            unhealthy: 2,
            healthy: 1,
        };
        let cell = HealthCell::new(HealthState::Unknown);

        cell.record(false, &thresholds);
        cell.record(true, &thresholds);
        assert_eq!(cell.consecutive_failures(), 0);
        cell.record(false, &thresholds);
        assert_eq!(cell.state(), HealthState::Healthy);
    }

    #[test]
    fn recovery_needs_healthy_threshold() {
        let thresholds = Thresholds {
            unhealthy: 1,
            healthy: 2,
        };
        let cell = HealthCell::new(HealthState::Unknown);

        cell.record(false, &thresholds);
        assert_eq!(cell.state(), HealthState::Unhealthy);
        assert_eq!(cell.record(true, &thresholds), None);
        assert_eq!(cell.state(), HealthState::Unhealthy);
        assert!(cell.record(true, &thresholds).is_some());
        assert_eq!(cell.state(), HealthState::Healthy);
    }

    #[test]
    fn repeated_results_in_stable_state_do_not_transition() {
        let thresholds = Thresholds::default();
        let cell = HealthCell::new(HealthState::Unknown);

        cell.record(false, &thresholds);
        for _ in 0..10 {
            assert_eq!(cell.record(false, &thresholds), None);
            assert_eq!(cell.state(), HealthState::Unhealthy);
        }

        cell.record(true, &thresholds);
        for _ in 0..10 {
            assert_eq!(cell.record(true, &thresholds), None);
            assert_eq!(cell.state(), HealthState::Healthy);
        }
        assert_eq!(cell.consecutive_successes(), 11);
    }
}
