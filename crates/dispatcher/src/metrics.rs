//! Delivery metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Counters shared by the handoff, the offline queue and the sync worker
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    /// Events handed to the worker over the live channel
    handed_off: AtomicU64,
    /// Events written straight to the offline queue by the producer
    spilled: AtomicU64,
    /// Successful deliveries
    delivered: AtomicU64,
    /// Failed delivery attempts
    failures: AtomicU64,
    /// Live events moved into the offline queue by the worker
    requeued: AtomicU64,
    /// Events dropped (queue overflow, quarantine, storage failure)
    data_lost: AtomicU64,
    /// Current offline queue depth
    queue_depth: AtomicUsize,
}

impl DeliveryMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_handed_off(&self) {
        self.handed_off.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_spilled(&self) {
        self.spilled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requeued(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_data_lost(&self) {
        self.data_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Set current queue depth
    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            handed_off: self.handed_off.load(Ordering::Relaxed),
            spilled: self.spilled.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            data_lost: self.data_lost.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of delivery metrics (for reporting)
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliverySnapshot {
    pub handed_off: u64,
    pub spilled: u64,
    pub delivered: u64,
    pub failures: u64,
    pub requeued: u64,
    pub data_lost: u64,
    pub queue_depth: usize,
}
