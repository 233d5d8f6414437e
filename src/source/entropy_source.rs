//! Synchronous entropy source.

use crate::backend::{BackendFactory, Capabilities};
use crate::error::{EntropyError, Result};
use crate::lifecycle::{LifecycleManager, LifecycleState};
use crate::metrics::MetricsRegistry;
use crate::shaping::{self, EntropyRequest, RangeRequest, Whitened};
use std::sync::Arc;

/// Blocking access to one backend variant.
///
/// Every call blocks the calling thread for the duration of the backend
/// read and holds the backend lock throughout, including every draw of a
/// rejection-sampling loop. Use [`AsyncBridge`](crate::bridge::AsyncBridge)
/// from async code.
pub struct EntropySource<F: BackendFactory> {
    manager: LifecycleManager<F>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<F: BackendFactory> EntropySource<F> {
    /// Creates a source whose backend is built on first use.
    pub fn new(factory: F) -> Self {
        Self {
            manager: LifecycleManager::new(factory),
            metrics: None,
        }
    }

    /// Records request, build and error counts into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.manager = self.manager.with_metrics(Arc::clone(&metrics));
        self.metrics = Some(metrics);
        self
    }

    /// Capabilities declared by the backend factory.
    pub fn capabilities(&self) -> Capabilities {
        self.manager.capabilities()
    }

    /// Current lifecycle state of the backend slot.
    pub fn state(&self) -> LifecycleState {
        self.manager.state()
    }

    /// The attached metrics registry, if any.
    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Returns true if the backend can be built and answers its handshake.
    pub fn probe(&self) -> bool {
        self.manager.probe()
    }

    /// Serves a byte or bit request.
    pub fn read(&self, request: &EntropyRequest) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let caps = self.capabilities();
        request.validate(&caps)?;
        self.count_request();

        let data = self.manager.with_backend(|backend| {
            shaping::fulfil(&mut Whitened::new(backend, request.folds), request, &caps)
        })?;

        if let Some(metrics) = &self.metrics {
            metrics.bytes_delivered_total.inc_by(data.len() as u64);
        }
        tracing::debug!(
            kind = ?request.kind,
            size = request.size,
            folds = request.folds,
            "Served entropy"
        );
        Ok(data)
    }

    /// Exactly `n` bytes.
    pub fn read_bytes(&self, n: usize) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::bytes(n))
    }

    /// `ceil(n/8)` bytes; the unused tail bits are left as produced.
    pub fn read_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::bits(n))
    }

    /// `ceil(n/8)` bytes with the unused tail bits zeroed.
    pub fn read_exact_bits(&self, n: usize) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::exact_bits(n))
    }

    /// Like [`read_bytes`](Self::read_bytes), whitened by `folds` XOR folds.
    pub fn read_bytes_folded(&self, n: usize, folds: u32) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::bytes(n).with_folds(folds))
    }

    /// Like [`read_bits`](Self::read_bits), whitened by `folds` XOR folds.
    pub fn read_bits_folded(&self, n: usize, folds: u32) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::bits(n).with_folds(folds))
    }

    /// Like [`read_exact_bits`](Self::read_exact_bits), whitened by `folds` XOR folds.
    pub fn read_exact_bits_folded(&self, n: usize, folds: u32) -> Result<Vec<u8>> {
        self.read(&EntropyRequest::exact_bits(n).with_folds(folds))
    }

    /// Draws an integer, whitening every draw with `folds` folds.
    pub fn sample(&self, request: &RangeRequest, folds: u32) -> Result<i64> {
        self.ensure_open()?;
        shaping::validate_sample(request, folds, &self.capabilities())?;
        self.count_request();

        let (value, rejected) = self.manager.with_backend(|backend| {
            shaping::sample_counted(&mut Whitened::new(backend, folds), request)
        })?;

        if let Some(metrics) = &self.metrics {
            metrics.rejected_draws_total.inc_by(rejected);
        }
        Ok(value)
    }

    /// Uniform integer in `[min, max)`, or a raw unsigned 32-bit value when
    /// `max` is `None` (which requires `min >= 0`).
    pub fn sample_int(&self, min: i64, max: Option<i64>) -> Result<i64> {
        self.sample(&RangeRequest { min, max }, 0)
    }

    /// Like [`sample_int`](Self::sample_int), whitening every draw.
    pub fn sample_int_folded(&self, min: i64, max: Option<i64>, folds: u32) -> Result<i64> {
        self.sample(&RangeRequest { min, max }, folds)
    }

    /// Discards the backend handle; the next request builds a new one.
    pub fn reset(&self) {
        self.manager.reset();
    }

    /// Tears the backend down and fails every later request with
    /// `ShutdownFailure` until [`reset`](Self::reset).
    pub fn close(&self) {
        self.manager.close();
    }

    // A closed source reports shutdown ahead of argument errors.
    fn ensure_open(&self) -> Result<()> {
        if self.state() == LifecycleState::Closed {
            return Err(EntropyError::ShutdownFailure);
        }
        Ok(())
    }

    fn count_request(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.requests_total.inc();
        }
    }
}
