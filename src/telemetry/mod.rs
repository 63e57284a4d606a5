//! Runtime metrics.
//!
//! With the `telemetry` feature disabled a no-op collector with the same
//! surface takes its place, so call sites never need to be feature-gated.

#[cfg(feature = "telemetry")]
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};

// Stub implementations when telemetry is disabled
#[cfg(not(feature = "telemetry"))]
pub mod metrics {
    use std::time::Duration;

    #[derive(Debug, Clone, Default)]
    pub struct Metrics;

    impl Metrics {
        pub fn new() -> Self { Self }
        pub fn record_task_execution(&self, _: u64) {}
        pub fn record_task_stolen(&self) {}
        pub fn record_task_panic(&self) {}
        pub fn record_submitted(&self) {}
        pub fn record_success(&self, _: u64) {}
        pub fn record_failure(&self, _: u64) {}
        pub fn record_operation_panic(&self, _: u64) {}
        pub fn snapshot(&self) -> MetricsSnapshot { MetricsSnapshot::default() }
    }

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
}
