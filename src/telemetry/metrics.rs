//! Metrics collection for runtime monitoring.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// One hour in nanoseconds.
const MAX_TRACKED_LATENCY_NS: u64 = 3_600_000_000_000;

/// Per-runtime metrics collector
#[derive(Debug)]
pub struct Metrics {
    // worker counters
    tasks_executed: AtomicU64,
    tasks_stolen: AtomicU64,
    tasks_panicked: AtomicU64,

    // operation outcomes
    operations_submitted: AtomicU64,
    operations_succeeded: AtomicU64,
    operations_failed: AtomicU64,
    operations_panicked: AtomicU64,

    // operation execution latency; `None` if the histogram could not be built
    latency_histogram: Option<RwLock<Histogram<u64>>>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        let histogram = Histogram::new_with_max(MAX_TRACKED_LATENCY_NS, 3)
            .ok()
            .map(RwLock::new);

        Self {
            tasks_executed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            operations_submitted: AtomicU64::new(0),
            operations_succeeded: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            operations_panicked: AtomicU64::new(0),
            latency_histogram: histogram,
            start_time: Instant::now(),
        }
    }

    pub fn record_task_execution(&self, _duration_ns: u64) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_stolen(&self) {
        self.tasks_stolen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_task_panic(&self) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self) {
        self.operations_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency_ns: u64) {
        self.operations_succeeded.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ns);
    }

    pub fn record_failure(&self, latency_ns: u64) {
        self.operations_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ns);
    }

    /// A panicking operation counts as failed as well.
    pub fn record_operation_panic(&self, latency_ns: u64) {
        self.operations_panicked.fetch_add(1, Ordering::Relaxed);
        self.record_failure(latency_ns);
    }

    fn record_latency(&self, latency_ns: u64) {
        if let Some(histogram) = &self.latency_histogram {
            if let Some(mut hist) = histogram.try_write() {
                let _ = hist.record(latency_ns.min(MAX_TRACKED_LATENCY_NS));
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (avg, p50, p99, max) = match &self.latency_histogram {
            Some(histogram) => {
                let hist = histogram.read();
                if hist.len() > 0 {
                    (
                        hist.mean() as u64,
                        hist.value_at_quantile(0.50),
                        hist.value_at_quantile(0.99),
                        hist.max(),
                    )
                } else {
                    (0, 0, 0, 0)
                }
            }
            None => (0, 0, 0, 0),
        };

        MetricsSnapshot {
            uptime: self.start_time.elapsed(),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_stolen: self.tasks_stolen.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            operations_submitted: self.operations_submitted.load(Ordering::Relaxed),
            operations_succeeded: self.operations_succeeded.load(Ordering::Relaxed),
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            operations_panicked: self.operations_panicked.load(Ordering::Relaxed),
            avg_latency_ns: avg,
            p50_latency_ns: p50,
            p99_latency_ns: p99,
            max_latency_ns: max,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub uptime: Duration,
    pub tasks_executed: u64,
    pub tasks_stolen: u64,
    pub tasks_panicked: u64,
    pub operations_submitted: u64,
    pub operations_succeeded: u64,
    pub operations_failed: u64,
    pub operations_panicked: u64,
    pub avg_latency_ns: u64,
    pub p50_latency_ns: u64,
    pub p99_latency_ns: u64,
    pub max_latency_ns: u64,
}

impl MetricsSnapshot {
    /// Operations submitted but not yet completed.
    pub fn in_flight(&self) -> u64 {
        self.operations_submitted
            .saturating_sub(self.operations_succeeded + self.operations_failed)
    }

    pub fn failure_rate(&self) -> f64 {
        let done = self.operations_succeeded + self.operations_failed;
        if done == 0 {
            return 0.0;
        }
        self.operations_failed as f64 / done as f64
    }
}
