use std::num::NonZeroU32;
use std::time::Duration;

use crate::config::LiveSettings;

const MAX_BACKOFF_DOUBLINGS: u32 = 6;

/// Reconnection timing of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub min: Duration,
    pub max: Duration,
    /// Consecutive failed attempts before the outage is reported.
    pub report_after_attempts: NonZeroU32,
}

impl ReconnectPolicy {
    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// Doubles from `min` per failure and is clamped to `[min, max]`.
    pub fn delay(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(MAX_BACKOFF_DOUBLINGS);
        self.min
            .saturating_mul(1 << doublings)
            .min(self.max)
            .max(self.min)
    }

    pub fn should_report(&self, failures: u32) -> bool {
        failures >= self.report_after_attempts.get()
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(1),
            max: Duration::from_secs(30),
            report_after_attempts: NonZeroU32::MIN.saturating_add(4),
        }
    }
}

impl From<&LiveSettings> for ReconnectPolicy {
    fn from(settings: &LiveSettings) -> Self {
        Self {
            min: settings.reconnect_min,
            max: settings.reconnect_max,
            report_after_attempts: settings.report_after_attempts,
        }
    }
}
