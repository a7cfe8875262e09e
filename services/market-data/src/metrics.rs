//! Collector metrics
//!
//! Lock-free counters for the dispatch loop plus a bounded latency window
//! for per-event dispatch time. `export()` flattens everything into a
//! sorted map for whatever exposition the host process uses.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Samples kept by the dispatch latency window.
pub const LATENCY_WINDOW: usize = 1000;

/// Counters shared between the collector and its readers.
#[derive(Debug)]
pub struct CollectorMetrics {
    pub events_dispatched: AtomicU64,
    /// Events not applied: unregistered instrument or rejected payload
    pub events_dropped: AtomicU64,
    pub feed_errors: AtomicU64,
    pub interrupts: AtomicU64,
    pub resync_attempts: AtomicU64,
    pub resync_failures: AtomicU64,
    dispatch_ns: Mutex<LatencyTracker>,
}

impl CollectorMetrics {
    pub fn new() -> Self {
        Self {
            events_dispatched: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            feed_errors: AtomicU64::new(0),
            interrupts: AtomicU64::new(0),
            resync_attempts: AtomicU64::new(0),
            resync_failures: AtomicU64::new(0),
            dispatch_ns: Mutex::new(LatencyTracker::new(LATENCY_WINDOW)),
        }
    }

    pub fn record_dispatch(&self, latency_ns: u64) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
        self.dispatch_ns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(latency_ns);
    }

    pub fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feed_error(&self) {
        self.feed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resync(&self, succeeded: bool) {
        self.resync_attempts.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.resync_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("events_dispatched".to_string(), self.events_dispatched.load(Ordering::Relaxed));
        m.insert("events_dropped".to_string(), self.events_dropped.load(Ordering::Relaxed));
        m.insert("feed_errors".to_string(), self.feed_errors.load(Ordering::Relaxed));
        m.insert("interrupts".to_string(), self.interrupts.load(Ordering::Relaxed));
        m.insert("resync_attempts".to_string(), self.resync_attempts.load(Ordering::Relaxed));
        m.insert("resync_failures".to_string(), self.resync_failures.load(Ordering::Relaxed));

        let tracker = self.dispatch_ns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(p50) = tracker.percentile(50) {
            m.insert("dispatch_p50_ns".to_string(), p50);
        }
        if let Some(p99) = tracker.percentile(99) {
            m.insert("dispatch_p99_ns".to_string(), p99);
        }
        if let Some(avg) = tracker.average() {
            m.insert("dispatch_avg_ns".to_string(), avg);
        }
        m.insert("dispatch_samples".to_string(), tracker.count() as u64);
        m
    }
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding window of latency samples.
#[derive(Debug)]
pub struct LatencyTracker {
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn record(&mut self, value: u64) {
        if self.max_samples == 0 {
            return;
        }
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Nearest-rank percentile (0-100) over the window.
    ///
    /// The rank is `ceil(p * n / 100)` clamped to `1..=n`.
    pub fn percentile(&self, p: usize) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        let n = sorted.len();
        let rank = (p.min(100) * n).div_ceil(100).clamp(1, n);
        sorted.get(rank - 1).copied()
    }

    pub fn average(&self) -> Option<u64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: u64 = self.samples.iter().sum();
        Some(sum / self.samples.len() as u64)
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_export() {
        let metrics = CollectorMetrics::new();

        metrics.record_dispatch(500);
        metrics.record_dispatch(1500);
        metrics.record_dropped();
        metrics.record_feed_error();
        metrics.record_interrupt();
        metrics.record_resync(true);
        metrics.record_resync(false);

        let exported = metrics.export();
        assert_eq!(exported["events_dispatched"], 2);
        assert_eq!(exported["events_dropped"], 1);
        assert_eq!(exported["feed_errors"], 1);
        assert_eq!(exported["interrupts"], 1);
        assert_eq!(exported["resync_attempts"], 2);
        assert_eq!(exported["resync_failures"], 1);
        assert_eq!(exported["dispatch_p99_ns"], 1500);
        assert_eq!(exported["dispatch_p50_ns"], 500);
        assert_eq!(exported["dispatch_avg_ns"], 1000);
        assert_eq!(exported["dispatch_samples"], 2);
    }

    #[test]
    fn test_export_without_latency_samples() {
        let exported = CollectorMetrics::new().export();
        assert_eq!(exported["events_dispatched"], 0);
        assert!(!exported.contains_key("dispatch_p50_ns"));
        assert!(!exported.contains_key("dispatch_avg_ns"));
        assert_eq!(exported["dispatch_samples"], 0);
    }

    #[test]
    fn test_percentile_of_two_samples_uses_nearest_rank() {
        let mut tracker = LatencyTracker::new(10);
        tracker.record(1500);
        tracker.record(500);

        assert_eq!(tracker.percentile(0), Some(500));
        assert_eq!(tracker.percentile(50), Some(500));
        assert_eq!(tracker.percentile(51), Some(1500));
        assert_eq!(tracker.percentile(99), Some(1500));
        assert_eq!(tracker.percentile(100), Some(1500));
    }

    #[test]
    fn test_percentile_of_single_sample() {
        let mut tracker = LatencyTracker::new(10);
        tracker.record(42);

        assert_eq!(tracker.percentile(0), Some(42));
        assert_eq!(tracker.percentile(99), Some(42));
        assert_eq!(tracker.percentile(250), Some(42));
    }

    #[test]
    fn test_latency_tracker_percentile() {
        let mut tracker = LatencyTracker::new(100);
        for i in 1..=100 {
            tracker.record(i);
        }

        assert_eq!(tracker.percentile(50), Some(50));
        assert_eq!(tracker.percentile(99), Some(99));
        assert_eq!(tracker.percentile(100), Some(100));
        assert_eq!(tracker.percentile(0), Some(1));
    }

    #[test]
    fn test_latency_tracker_window_eviction() {
        let mut tracker = LatencyTracker::new(3);

        tracker.record(10);
        tracker.record(20);
        tracker.record(30);
        tracker.record(40); // evicts 10

        assert_eq!(tracker.count(), 3);
        assert_eq!(tracker.average(), Some(30));
    }
}
