//! Bounded exponential backoff per object

use std::time::Duration;

use dashmap::DashMap;

/// Consecutive failure counts keyed by object.
#[derive(Debug)]
pub struct RetryTracker {
    failures: DashMap<String, u32>,
    threshold: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: DashMap::new(),
            threshold,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
        }
    }

    /// Count a failure for `key` and return the delay before the next
    /// attempt, or `None` once more than `threshold` attempts have failed.
    /// Giving up clears the count.
    pub fn record_failure(&self, key: &str) -> Option<Duration> {
        let attempt = {
            let mut count = self.failures.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if attempt > self.threshold {
            self.failures.remove(key);
            return None;
        }

        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }

    pub fn reset(&self, key: &str) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).map(|count| *count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_threshold() {
        let tracker = RetryTracker::new(3);

        assert_eq!(tracker.record_failure("ns/claim"), Some(Duration::from_secs(1)));
        assert_eq!(tracker.record_failure("ns/claim"), Some(Duration::from_secs(2)));
        assert_eq!(tracker.record_failure("ns/claim"), Some(Duration::from_secs(4)));
        assert_eq!(tracker.failures("ns/claim"), 3);

        assert_eq!(tracker.record_failure("ns/claim"), None);
        assert_eq!(tracker.failures("ns/claim"), 0);
    }

    #[test]
    fn test_backoff_is_capped() {
        let tracker = RetryTracker::new(20);
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            last = tracker.record_failure("pv/pvc-1").unwrap();
        }
        assert_eq!(last, Duration::from_secs(300));
    }

    #[test]
    fn test_keys_are_independent_and_resettable() {
        let tracker = RetryTracker::new(5);
        tracker.record_failure("a");
        tracker.record_failure("a");
        tracker.record_failure("b");

        assert_eq!(tracker.failures("a"), 2);
        assert_eq!(tracker.failures("b"), 1);

        tracker.reset("a");
        assert_eq!(tracker.failures("a"), 0);
        assert_eq!(tracker.record_failure("a"), Some(Duration::from_secs(1)));
    }
}
