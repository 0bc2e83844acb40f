//! Bounded-retry polling.
//!
//! tmux offers no push notifications for pane or option changes, so waiting
//! for state is modeled as "check, sleep, check again" until a deadline.

use std::thread::sleep;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollSettings {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            interval: Duration::from_millis(100),
        }
    }
}

/// Call `check` until it returns true or `settings.timeout` elapses.
///
/// `check` always runs at least once. Returns whether it ever succeeded.
pub fn poll_until(settings: PollSettings, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    loop {
        if check() {
            return true;
        }
        if start.elapsed() >= settings.timeout {
            return false;
        }
        sleep(settings.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(timeout_ms: u64) -> PollSettings {
        PollSettings::new(Duration::from_millis(timeout_ms), Duration::from_millis(5))
    }

    #[test]
    fn test_returns_immediately_on_success() {
        let mut calls = 0;
        let start = Instant::now();
        assert!(poll_until(fast(1000), || {
            calls += 1;
            true
        }));
        assert_eq!(calls, 1);
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_succeeds_after_retries() {
        let mut calls = 0;
        assert!(poll_until(fast(1000), || {
            calls += 1;
            calls == 3
        }));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_times_out_without_panicking() {
        let start = Instant::now();
        assert!(!poll_until(fast(50), || false));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
