//! Linear reconnect backoff with a hard attempt cap.

use std::time::Duration;

use rtsession_core::{ClientConfig, TerminalReason};

/// Units added to every delay before scaling.
const BASE_UNITS: u32 = 10;

/// Scale applied to the unit count.
const UNIT_SCALE: u32 = 60;

/// Reconnect bound and delay schedule.
///
/// Attempt `n` (1-based) waits `(n - 1 + 10) * 60` units, so the schedule
/// grows by 60 units per attempt: 600, 660, 720, ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    unit: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, unit: Duration) -> Self {
        Self { max_attempts, unit }
    }

    #[must_use]
    pub const fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.max_reconnect_attempts, config.reconnect_unit())
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn unit(&self) -> Duration {
        self.unit
    }

    /// Number of units to wait before attempt `attempt`.
    #[must_use]
    pub const fn delay_units(attempt: u32) -> u32 {
        (attempt.saturating_sub(1) + BASE_UNITS) * UNIT_SCALE
    }

    /// Wait before attempt `attempt`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.unit * Self::delay_units(attempt)
    }

    /// Whether another attempt is allowed with `count` already used.
    #[must_use]
    pub const fn allows(&self, count: u32) -> bool {
        count < self.max_attempts
    }
}

/// What `on_disconnect` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A reconnect will run after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// The queue was cleared and the terminal notification enqueued.
    Terminal(TerminalReason),
}

impl DisconnectOutcome {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule() {
        assert_eq!(ReconnectPolicy::delay_units(1), 600);
        assert_eq!(ReconnectPolicy::delay_units(2), 660);
        assert_eq!(ReconnectPolicy::delay_units(5), 840);

        let policy = ReconnectPolicy::new(5, Duration::from_millis(1));
        assert_eq!(policy.delay_for(1), Duration::from_millis(600));
        assert_eq!(policy.delay_for(2), Duration::from_millis(660));
    }

    #[test]
    fn test_zero_attempt_does_not_underflow() {
        assert_eq!(ReconnectPolicy::delay_units(0), 600);
    }

    #[test]
    fn test_bound() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }
}
