//! Failure governor
//!
//! Counts consecutive failed cycles and raises a single alert when the count
//! reaches the threshold. The count keeps growing past the threshold without
//! re-alerting until a success or manual reset clears it.

use fuelwatch_core::config::DEFAULT_FAILURE_THRESHOLD;
use fuelwatch_core::FailureReason;

/// Raised exactly once per failure streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureAlert {
    pub failure_count: u32,
    pub reason: FailureReason,
}

#[derive(Debug, Clone)]
pub struct FailureGovernor {
    consecutive_failures: u32,
    threshold: u32,
    last_reason: Option<FailureReason>,
}

impl FailureGovernor {
    /// Governor alerting after `threshold` consecutive failures (at least 1).
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: 0,
            threshold: threshold.max(1),
            last_reason: None,
        }
    }

    /// Count a failure; returns the alert when the streak reaches the threshold.
    pub fn record_failure(&mut self, reason: FailureReason) -> Option<FailureAlert> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_reason = Some(reason);

        (self.consecutive_failures == self.threshold).then_some(FailureAlert {
            failure_count: self.consecutive_failures,
            reason,
        })
    }

    pub fn record_success(&mut self) {
        self.reset();
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.last_reason = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Reason of the most recent failure in the current streak.
    pub fn last_reason(&self) -> Option<FailureReason> {
        self.last_reason
    }
}

impl Default for FailureGovernor {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD)
    }
}
