//! Metrics collection and registry.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registering or encoding a metric failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Point-in-time values of every metric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Requests served, failed ones included.
    pub requests: u64,
    /// Shaped bytes handed to callers.
    pub bytes_delivered: u64,
    /// Rejection-sampling draws thrown away.
    pub rejected_draws: u64,
    /// Backend handles constructed.
    pub backend_builds: u64,
    /// Resets that tore down a live handle.
    pub resets: u64,
    /// Errors reported by backends.
    pub backend_errors: u64,
    /// Tasks accepted by the async bridge.
    pub tasks_submitted: u64,
    /// Tasks cancelled before or during execution.
    pub tasks_cancelled: u64,
    /// Tasks queued but not yet picked up by a worker.
    pub queue_depth: i64,
}

/// Prometheus metrics registry for entropy sources.
pub struct MetricsRegistry {
    registry: Registry,

    // Request metrics
    pub(crate) requests_total: IntCounter,
    pub(crate) bytes_delivered_total: IntCounter,
    pub(crate) rejected_draws_total: IntCounter,

    // Lifecycle metrics
    pub(crate) backend_builds_total: IntCounter,
    pub(crate) resets_total: IntCounter,
    pub(crate) backend_errors_total: IntCounter,

    // Bridge metrics
    pub(crate) tasks_submitted_total: IntCounter,
    pub(crate) tasks_cancelled_total: IntCounter,
    pub(crate) queue_depth: IntGauge,
}

impl MetricsRegistry {
    /// Creates a new registry with all entropy metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let requests_total = IntCounter::new(
            "rng_devices_requests_total",
            "Total entropy requests served",
        )?;
        let bytes_delivered_total = IntCounter::new(
            "rng_devices_bytes_delivered_total",
            "Total shaped bytes returned to callers",
        )?;
        let rejected_draws_total = IntCounter::new(
            "rng_devices_rejected_draws_total",
            "Total out-of-range draws discarded by rejection sampling",
        )?;

        let backend_builds_total = IntCounter::new(
            "rng_devices_backend_builds_total",
            "Total backend handles constructed",
        )?;
        let resets_total = IntCounter::new(
            "rng_devices_resets_total",
            "Total resets that tore down a live backend",
        )?;
        let backend_errors_total = IntCounter::new(
            "rng_devices_backend_errors_total",
            "Total errors reported by backends",
        )?;

        let tasks_submitted_total = IntCounter::new(
            "rng_devices_bridge_tasks_submitted_total",
            "Total tasks dispatched to the worker pool",
        )?;
        let tasks_cancelled_total = IntCounter::new(
            "rng_devices_bridge_tasks_cancelled_total",
            "Total bridge tasks cancelled by their caller",
        )?;
        let queue_depth = IntGauge::new(
            "rng_devices_bridge_queue_depth",
            "Tasks waiting for a worker",
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(bytes_delivered_total.clone()))?;
        registry.register(Box::new(rejected_draws_total.clone()))?;
        registry.register(Box::new(backend_builds_total.clone()))?;
        registry.register(Box::new(resets_total.clone()))?;
        registry.register(Box::new(backend_errors_total.clone()))?;
        registry.register(Box::new(tasks_submitted_total.clone()))?;
        registry.register(Box::new(tasks_cancelled_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            bytes_delivered_total,
            rejected_draws_total,
            backend_builds_total,
            resets_total,
            backend_errors_total,
            tasks_submitted_total,
            tasks_cancelled_total,
            queue_depth,
        })
    }

    /// Reads back the current value of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests_total.get(),
            bytes_delivered: self.bytes_delivered_total.get(),
            rejected_draws: self.rejected_draws_total.get(),
            backend_builds: self.backend_builds_total.get(),
            resets: self.resets_total.get(),
            backend_errors: self.backend_errors_total.get(),
            tasks_submitted: self.tasks_submitted_total.get(),
            tasks_cancelled: self.tasks_cancelled_total.get(),
            queue_depth: self.queue_depth.get(),
        }
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
