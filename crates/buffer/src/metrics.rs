//! Buffer metrics for observability

use observability::{OutputDeliveryStats, RunningStats};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single buffer
#[derive(Debug, Default)]
pub struct BufferMetrics {
    /// Current flush queue length
    queue_len: AtomicUsize,
    /// Records accepted by appends
    appended_records: AtomicU64,
    /// Chunks sealed and enqueued
    sealed_count: AtomicU64,
    /// Chunks written successfully
    flushed_count: AtomicU64,
    /// Records written successfully
    flushed_records: AtomicU64,
    /// Write retries
    retry_count: AtomicU64,
    /// Chunks dropped after exhausting retries, or left staged at close
    discarded_count: AtomicU64,
    /// Appends rejected because the queue was full
    overflow_count: AtomicU64,
    /// Size of flushed chunks (bytes)
    chunk_bytes: Mutex<RunningStats>,
    /// Time from first attempt to success (ms)
    flush_latency_ms: Mutex<RunningStats>,
}

impl BufferMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn add_appended(&self, records: usize) {
        self.appended_records
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn inc_sealed(&self) {
        self.sealed_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful write
    pub fn record_flush(&self, records: usize, bytes: usize, latency_ms: f64) {
        self.flushed_count.fetch_add(1, Ordering::Relaxed);
        self.flushed_records
            .fetch_add(records as u64, Ordering::Relaxed);
        self.chunk_bytes.lock().push(bytes as f64);
        self.flush_latency_ms.lock().push(latency_ms);
    }

    pub fn inc_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_discarded(&self) {
        self.discarded_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_overflow(&self) {
        self.overflow_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> BufferMetricsSnapshot {
        BufferMetricsSnapshot {
            queue_len: self.queue_len(),
            appended_records: self.appended_records.load(Ordering::Relaxed),
            sealed_count: self.sealed_count.load(Ordering::Relaxed),
            flushed_count: self.flushed_count.load(Ordering::Relaxed),
            flushed_records: self.flushed_records.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            discarded_count: self.discarded_count.load(Ordering::Relaxed),
            overflow_count: self.overflow_count.load(Ordering::Relaxed),
            chunk_bytes: self.chunk_bytes.lock().clone(),
            flush_latency_ms: self.flush_latency_ms.lock().clone(),
        }
    }
}

/// Snapshot of buffer metrics (for reporting)
#[derive(Debug, Clone)]
pub struct BufferMetricsSnapshot {
    pub queue_len: usize,
    pub appended_records: u64,
    pub sealed_count: u64,
    pub flushed_count: u64,
    pub flushed_records: u64,
    pub retry_count: u64,
    pub discarded_count: u64,
    pub overflow_count: u64,
    pub chunk_bytes: RunningStats,
    pub flush_latency_ms: RunningStats,
}

impl BufferMetricsSnapshot {
    /// Delivery statistics for run summaries
    pub fn delivery_stats(&self) -> OutputDeliveryStats {
        OutputDeliveryStats {
            chunks_flushed: self.flushed_count,
            records_flushed: self.flushed_records,
            flush_retries: self.retry_count,
            chunks_discarded: self.discarded_count,
            chunk_bytes: self.chunk_bytes.clone(),
            flush_latency_ms: self.flush_latency_ms.clone(),
            ..Default::default()
        }
    }
}
