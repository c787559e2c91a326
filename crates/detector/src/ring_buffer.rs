//! Time-windowed sample history.
//!
//! Capacity is bounded by time, not count: every push evicts samples older
//! than `window_seconds` relative to the newest timestamp.

use std::collections::VecDeque;
use std::fmt;

use contracts::Sample;

/// Time-windowed ring buffer
///
/// Owned by the sampling loop only. Order is monotonic by timestamp; samples
/// with equal timestamps keep their arrival order.
pub struct RingBuffer {
    samples: VecDeque<Sample>,
    window_seconds: f64,
    evicted_count: u64,
    out_of_order_count: u64,
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.samples.len())
            .field("window_seconds", &self.window_seconds)
            .field("evicted", &self.evicted_count)
            .field("out_of_order", &self.out_of_order_count)
            .finish()
    }
}

impl RingBuffer {
    /// Create an empty buffer retaining `window_seconds` of history
    pub fn new(window_seconds: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_seconds,
            evicted_count: 0,
            out_of_order_count: 0,
        }
    }

    /// Insert a sample and evict everything outside the window
    ///
    /// A sample older than the current newest is rejected (returns `false`)
    /// so the buffer stays ordered.
    #[inline]
    pub fn push(&mut self, sample: Sample) -> bool {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                self.out_of_order_count += 1;
                return false;
            }
        }

        let horizon = sample.timestamp;
        self.samples.push_back(sample);

        while let Some(oldest) = self.samples.front() {
            if horizon - oldest.timestamp <= self.window_seconds {
                break;
            }
            self.samples.pop_front();
            self.evicted_count += 1;
        }
        true
    }

    /// Copy of every sample with `timestamp >= since`, oldest first
    pub fn snapshot(&self, since: f64) -> Vec<Sample> {
        let start = self.samples.partition_point(|s| s.timestamp < since);
        self.samples.range(start..).copied().collect()
    }

    /// Sample whose timestamp is closest to `target`
    ///
    /// On equal distance the earlier-arrived sample wins.
    pub fn closest_to(&self, target: f64) -> Option<&Sample> {
        if self.samples.is_empty() {
            return None;
        }

        let idx = self.samples.partition_point(|s| s.timestamp < target);
        let after = self.samples.get(idx);
        let before = idx
            .checked_sub(1)
            .and_then(|i| self.samples.get(i))
            .map(|s| {
                // first arrival among equal timestamps
                let first = self.samples.partition_point(|o| o.timestamp < s.timestamp);
                &self.samples[first]
            });

        match (before, after) {
            (Some(b), Some(a)) => {
                if target - b.timestamp <= a.timestamp - target {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (Some(b), None) => Some(b),
            (None, a) => a,
        }
    }

    /// Oldest retained sample
    #[inline]
    pub fn oldest(&self) -> Option<&Sample> {
        self.samples.front()
    }

    /// Newest retained sample
    #[inline]
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Number of retained samples
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Configured window
    pub fn window_seconds(&self) -> f64 {
        self.window_seconds
    }

    /// Samples evicted by the window so far
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count
    }

    /// Samples rejected for arriving out of order
    pub fn out_of_order_count(&self) -> u64 {
        self.out_of_order_count
    }
}
