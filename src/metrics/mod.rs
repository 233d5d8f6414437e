//! Prometheus metrics for entropy sources.
//!
//! # Metrics Exposed
//!
//! ## Requests
//! - `rng_devices_requests_total` - Entropy requests served
//! - `rng_devices_bytes_delivered_total` - Shaped bytes returned to callers
//! - `rng_devices_rejected_draws_total` - Draws discarded by rejection sampling
//!
//! ## Lifecycle
//! - `rng_devices_backend_builds_total` - Backend handles constructed
//! - `rng_devices_resets_total` - Resets that tore down a live handle
//! - `rng_devices_backend_errors_total` - Errors reported by backends
//!
//! ## Async bridge
//! - `rng_devices_bridge_tasks_submitted_total` - Tasks dispatched to workers
//! - `rng_devices_bridge_tasks_cancelled_total` - Tasks cancelled by callers
//! - `rng_devices_bridge_queue_depth` - Tasks waiting for a worker
//!
//! # Example
//!
//! ```
//! use rng_devices::{backend::MockFactory, metrics::MetricsRegistry, EntropySource};
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(MetricsRegistry::new().expect("Failed to create registry"));
//! let source = EntropySource::new(MockFactory::new()).with_metrics(Arc::clone(&metrics));
//!
//! source.read_bytes(16).unwrap();
//! assert_eq!(metrics.snapshot().bytes_delivered, 16);
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
