//! Lock retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for [`Locker::obtain`](crate::Locker::obtain).
///
/// Contended locks are retried with an exponential backoff between
/// `min_backoff` and `max_backoff`. The total wait is bounded by `max_wait`
/// when set, otherwise by the lock TTL, and always by the deadline of the
/// handle's execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// First retry delay. Default: 16ms.
    #[serde(with = "hmux_types::duration::millis")]
    pub min_backoff: Duration,
    /// Retry delay cap. Default: 64ms.
    #[serde(with = "hmux_types::duration::millis")]
    pub max_backoff: Duration,
    /// Upper bound on the whole acquisition. Default: the lock TTL.
    #[serde(
        with = "hmux_types::duration::option_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_wait: Option<Duration>,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(16),
            max_backoff: Duration::from_millis(64),
            max_wait: None,
        }
    }
}

impl LockOptions {
    /// Backoff schedule for one acquisition attempt.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.min_backoff, self.max_backoff)
    }

    /// How long an acquisition may keep retrying for a lock with `ttl`.
    pub fn wait_window(&self, ttl: Duration) -> Duration {
        self.max_wait.unwrap_or(ttl)
    }
}

/// Doubling retry delays, starting at `min` and capped at `max`.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    next: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            next: min.min(max),
            max,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_mul(2).min(self.max);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = LockOptions::default();
        assert_eq!(opts.min_backoff, Duration::from_millis(16));
        assert_eq!(opts.max_backoff, Duration::from_millis(64));
        assert_eq!(opts.max_wait, None);
        assert_eq!(opts.wait_window(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let delays: Vec<_> = LockOptions::default().backoff().take(5).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(16),
                Duration::from_millis(32),
                Duration::from_millis(64),
                Duration::from_millis(64),
                Duration::from_millis(64),
            ]
        );
    }

    #[test]
    fn backoff_min_above_max_is_clamped() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(10));
        assert_eq!(b.next(), Some(Duration::from_millis(10)));
        assert_eq!(b.next(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn max_wait_overrides_ttl() {
        let opts = LockOptions {
            max_wait: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        assert_eq!(opts.wait_window(Duration::from_secs(3)), Duration::from_millis(50));
    }
}
