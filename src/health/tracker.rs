//! Per-backend health tracking.
//!
//! Tracks consecutive failures and applies the exclusion / cool-down
//! state machine for a single backend.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thresholds for the exclusion state machine.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Consecutive failures before a backend is excluded.
    pub failure_threshold: u32,
    /// How long an excluded backend stays out before it may serve again.
    pub cool_down: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cool_down: Duration::from_secs(2),
        }
    }
}

/// Failure counting and cool-down state for one backend.
///
/// A backend starts healthy. Once `failure_threshold` consecutive
/// failures accumulate it flips to excluded, and stays excluded until
/// the cool-down has elapsed past the most recent failure. Recovery is
/// lazy: the flip back to healthy happens on whichever [`is_healthy`]
/// or [`try_recover`] call first observes the elapsed cool-down, so the
/// state machine makes progress even with no background task running.
///
/// [`is_healthy`]: HealthTracker::is_healthy
/// [`try_recover`]: HealthTracker::try_recover
#[derive(Debug)]
pub struct HealthTracker {
    config: HealthConfig,
    /// Is this backend currently eligible for selection?
    healthy: AtomicBool,
    /// Consecutive failures since the last success or recovery.
    consecutive_failures: AtomicU32,
    /// Milliseconds since `birth` of the most recent failure (0 = never failed).
    last_failure_millis: AtomicU64,
    /// Monotonic anchor for failure timestamps.
    birth: Instant,
}

impl HealthTracker {
    /// Create a tracker in the healthy state.
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            last_failure_millis: AtomicU64::new(0),
            birth: Instant::now(),
        }
    }

    /// Check eligibility, performing lazy recovery if the cool-down has
    /// elapsed.
    pub fn is_healthy(&self) -> bool {
        if self.healthy.load(Ordering::Acquire) {
            return true;
        }
        if self.try_recover() {
            return true;
        }
        // A concurrent caller may have won the recovery race between
        // our two checks.
        self.healthy.load(Ordering::Acquire)
    }

    /// Read the health flag without triggering recovery.
    pub fn healthy_flag(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Flip an excluded backend back to healthy if its cool-down has
    /// elapsed.
    ///
    /// Returns true only for the caller that performed the transition,
    /// so exactly one observer can act on it (log it, re-admit the
    /// backend into a selection pool).
    pub fn try_recover(&self) -> bool {
        if self.healthy.load(Ordering::Acquire) {
            return false;
        }

        let last = self.last_failure_millis.load(Ordering::Acquire);
        if last != 0 && self.now_millis().saturating_sub(last) < cool_down_millis(&self.config) {
            return false;
        }

        if self
            .healthy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.consecutive_failures.store(0, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Record a successful invocation, resetting the failure streak.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    /// Record a failed invocation.
    ///
    /// Returns true only for the call whose failure crossed the
    /// threshold and excluded the backend.
    pub fn record_failure(&self) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        // 0 is the never-failed sentinel, so clamp up.
        self.last_failure_millis
            .store(self.now_millis().max(1), Ordering::Release);

        failures >= self.config.failure_threshold
            && self
                .healthy
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Consecutive failures since the last success or recovery.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    fn now_millis(&self) -> u64 {
        self.birth.elapsed().as_millis() as u64
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

fn cool_down_millis(config: &HealthConfig) -> u64 {
    config.cool_down.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(threshold: u32, cool_down: Duration) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            failure_threshold: threshold,
            cool_down,
        })
    }

    #[test]
    fn test_starts_healthy() {
        let t = HealthTracker::default();
        assert!(t.is_healthy());
        assert_eq!(t.consecutive_failures(), 0);
    }

    #[test]
    fn test_excluded_at_threshold() {
        let t = tracker(3, Duration::from_secs(60));

        // First two failures leave the backend eligible
        assert!(!t.record_failure());
        assert!(t.is_healthy());
        assert!(!t.record_failure());
        assert!(t.is_healthy());

        // Third failure crosses the threshold
        assert!(t.record_failure());
        assert!(!t.is_healthy());
        assert_eq!(t.consecutive_failures(), 3);
    }

    #[test]
    fn test_exclusion_transition_reported_once() {
        let t = tracker(2, Duration::from_secs(60));

        assert!(!t.record_failure());
        assert!(t.record_failure());
        // Straggler failures keep counting but do not re-transition
        assert!(!t.record_failure());
        assert_eq!(t.consecutive_failures(), 3);
    }

    #[test]
    fn test_success_resets_streak() {
        let t = tracker(3, Duration::from_secs(60));

        t.record_failure();
        t.record_failure();
        t.record_success();

        // The streak restarts, so two more failures stay below threshold
        assert!(!t.record_failure());
        assert!(!t.record_failure());
        assert!(t.is_healthy());
        assert!(t.record_failure());
        assert!(!t.is_healthy());
    }

    #[test]
    fn test_recovers_after_cool_down() {
        let t = tracker(1, Duration::from_millis(20));

        assert!(t.record_failure());
        assert!(!t.is_healthy());

        std::thread::sleep(Duration::from_millis(40));

        // Lazy recovery flips the flag and resets the streak
        assert!(t.is_healthy());
        assert_eq!(t.consecutive_failures(), 0);
    }

    #[test]
    fn test_stays_excluded_during_cool_down() {
        let t = tracker(1, Duration::from_secs(60));

        t.record_failure();
        assert!(!t.is_healthy());
        assert!(!t.try_recover());
        assert!(!t.healthy_flag());
    }

    #[test]
    fn test_new_failure_extends_cool_down() {
        let t = tracker(1, Duration::from_millis(150));

        t.record_failure();
        std::thread::sleep(Duration::from_millis(100));
        // A straggling in-flight failure lands mid cool-down
        t.record_failure();
        std::thread::sleep(Duration::from_millis(100));

        // 200ms past the first failure but only 100ms past the latest,
        // so the backend is still cooling down
        assert!(!t.is_healthy());
        std::thread::sleep(Duration::from_millis(100));
        assert!(t.is_healthy());
    }

    #[test]
    fn test_try_recover_reports_single_winner() {
        let t = tracker(1, Duration::from_millis(10));
        t.record_failure();
        std::thread::sleep(Duration::from_millis(20));

        assert!(t.try_recover());
        // Already healthy, nothing left to transition
        assert!(!t.try_recover());
        assert!(t.is_healthy());
    }
}
