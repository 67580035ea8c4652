//! Logger metrics for observability
//!
//! Counters for monitoring logger health: records delivered, records
//! dropped on a full queue, sink failures, and records no sink wanted.

use std::sync::atomic::{AtomicU64, Ordering};

/// # Example
///
/// ```
/// use log_express::LoggerMetrics;
///
/// let metrics = LoggerMetrics::new();
/// metrics.record_delivered();
/// metrics.record_sink_failure();
///
/// assert_eq!(metrics.total_delivered(), 1);
/// assert_eq!(metrics.sink_failures(), 1);
/// ```
#[derive(Debug)]
pub struct LoggerMetrics {
    /// Records handed to at least one sink without error
    total_delivered: AtomicU64,

    /// Records dropped before reaching any sink (queue full, logger stopped)
    dropped_count: AtomicU64,

    /// Individual sink write failures (errors and panics)
    sink_failures: AtomicU64,

    /// Records below every sink's threshold
    filtered_count: AtomicU64,

    /// Number of times the queue became full
    queue_full_events: AtomicU64,
}

impl LoggerMetrics {
    pub const fn new() -> Self {
        Self {
            total_delivered: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            filtered_count: AtomicU64::new(0),
            queue_full_events: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn total_delivered(&self) -> u64 {
        self.total_delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sink_failures(&self) -> u64 {
        self.sink_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn filtered_count(&self) -> u64 {
        self.filtered_count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn queue_full_events(&self) -> u64 {
        self.queue_full_events.load(Ordering::Relaxed)
    }

    /// Returns the previous value
    #[inline]
    pub fn record_delivered(&self) -> u64 {
        self.total_delivered.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the previous value
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped_count.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_sink_failure(&self) -> u64 {
        self.sink_failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_filtered(&self) -> u64 {
        self.filtered_count.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_queue_full(&self) -> u64 {
        self.queue_full_events.fetch_add(1, Ordering::Relaxed)
    }

    /// Drop rate as a percentage (0.0 - 100.0), 0.0 before any traffic
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.total_delivered() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }
}

impl Default for LoggerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
