//! Per-segment scoring latency tracking.
//!
//! [`LatencyTracker`] keeps a sliding window of recent scoring durations
//! and reports percentile statistics. The pipeline records one sample per
//! segment that reached the detector, including segments that later timed
//! out, so slow outliers stay visible.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Default number of samples to retain in the sliding window.
pub const DEFAULT_WINDOW: usize = 1000;

/// Latency summary over the current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
}

/// Thread-safe sliding window of scoring durations.
///
/// # Example
///
/// ```
/// use aitint_detect::inference_stats::LatencyTracker;
/// use std::time::Duration;
///
/// let tracker = LatencyTracker::new(16);
/// tracker.record(Duration::from_millis(10));
/// tracker.record(Duration::from_millis(30));
/// let stats = tracker.stats().unwrap();
/// assert_eq!(stats.count, 2);
/// assert_eq!(stats.mean, Duration::from_millis(20));
/// ```
pub struct LatencyTracker {
    window: Mutex<VecDeque<Duration>>,
    capacity: usize,
}

impl LatencyTracker {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record one duration, evicting the oldest sample when full.
    pub fn record(&self, duration: Duration) {
        let mut window = self.window.lock().unwrap_or_else(|e| e.into_inner());
        if window.len() >= self.capacity {
            window.pop_front();
        }
        window.push_back(duration);
    }

    /// Percentile statistics, or `None` before the first sample.
    #[must_use]
    pub fn stats(&self) -> Option<LatencyStats> {
        let mut sorted: Vec<Duration> = {
            let window = self.window.lock().unwrap_or_else(|e| e.into_inner());
            window.iter().copied().collect()
        };
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        Some(LatencyStats {
            count,
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            min: sorted[0],
            max: sorted[count - 1],
            mean: total / count as u32,
        })
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.window.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Nearest-rank percentile of a non-empty sorted slice.
fn percentile(sorted: &[Duration], pct: f64) -> Duration {
    let last = sorted.len() - 1;
    let idx = ((pct / 100.0) * last as f64).round() as usize;
    sorted[idx.min(last)]
}
