//! Retry pacing for a failing `accept()`.

use std::time::Duration;

const FLOOR: Duration = Duration::from_millis(1);

/// Exponential back-off applied when the listener fails to accept.
///
/// The first retry waits `initial_delay`; each further consecutive failure
/// doubles the wait up to `max_delay`. A successful accept resets it.
/// Defaults are 10 ms and 1 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the wait.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Build a configuration from millisecond values, as read from a config
    /// file.
    #[must_use]
    pub fn from_millis(initial: u64, max: u64) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial),
            max_delay: Duration::from_millis(max),
        }
        .normalized()
    }

    /// Raise both delays to at least 1 ms and order them.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use drugwire::server::BackoffConfig;
    ///
    /// let cfg = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(cfg.initial_delay, Duration::from_millis(1));
    /// assert_eq!(cfg.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let a = self.initial_delay.max(FLOOR);
        let b = self.max_delay.max(FLOOR);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }

    /// The wait that follows `current` after another failure.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}
