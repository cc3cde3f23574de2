//! Thread-safe progress tracking.
//!
//! Partition workers share one tracker per run; it maintains an atomic count
//! and logs whenever an interval boundary is crossed.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts processed items and logs at interval boundaries.
///
/// # Example
/// ```
/// use bamfq_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Processed records").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Processed records 250 (complete)"
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Creates a tracker with a count of zero and the default interval of
    /// 1,000,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 1_000_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Sets the logging interval.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Atomically adds `additional` to the count, logging once per interval
    /// boundary crossed. Returns true if the new count sits exactly on a
    /// boundary, which `log_final` uses to avoid a duplicate line.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && count % self.interval == 0;
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;

        for i in (prev / self.interval + 1)..=(new_count / self.interval) {
            info!("{} {}", self.message, i * self.interval);
        }
        new_count % self.interval == 0
    }

    /// Logs the final count unless the last increment already logged it.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    /// The current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_detection() {
        let tracker = ProgressTracker::new("Test").with_interval(10);

        assert!(!tracker.log_if_needed(5)); // 5
        assert!(!tracker.log_if_needed(3)); // 8
        assert!(tracker.log_if_needed(2)); // 10, on boundary
        assert!(!tracker.log_if_needed(15)); // 25, crossed 20
        assert_eq!(tracker.count(), 25);
    }

    #[test]
    fn test_zero_additional_inspects_only() {
        let tracker = ProgressTracker::new("Test").with_interval(10);
        assert!(!tracker.log_if_needed(0));
        tracker.log_if_needed(10);
        assert!(tracker.log_if_needed(0));
        assert_eq!(tracker.count(), 10);
    }

    #[test]
    fn test_concurrent_counting() {
        use std::sync::Arc;

        let tracker = Arc::new(ProgressTracker::new("Test").with_interval(1000));
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || {
                    for _ in 0..125 {
                        tracker.log_if_needed(1);
                    }
                });
            }
        });
        assert_eq!(tracker.count(), 1000);
    }
}
