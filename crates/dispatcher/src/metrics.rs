//! Route metrics for observability

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a routing output
#[derive(Debug, Default)]
pub struct RouteMetrics {
    /// emits forwarded to a resolved output
    routed_count: AtomicU64,
    /// events carried by forwarded emits
    routed_events: AtomicU64,
    /// emits without a route
    miss_count: AtomicU64,
    /// forwarded emits the target rejected
    failure_count: AtomicU64,
}

impl RouteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routed_count(&self) -> u64 {
        self.routed_count.load(Ordering::Relaxed)
    }

    pub fn inc_routed(&self, events: usize) {
        self.routed_count.fetch_add(1, Ordering::Relaxed);
        self.routed_events.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count.load(Ordering::Relaxed)
    }

    pub fn inc_miss(&self) {
        self.miss_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> RouteMetricsSnapshot {
        RouteMetricsSnapshot {
            routed_count: self.routed_count(),
            routed_events: self.routed_events.load(Ordering::Relaxed),
            miss_count: self.miss_count(),
            failure_count: self.failure_count(),
        }
    }
}

/// Snapshot of route metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteMetricsSnapshot {
    pub routed_count: u64,
    pub routed_events: u64,
    pub miss_count: u64,
    pub failure_count: u64,
}
