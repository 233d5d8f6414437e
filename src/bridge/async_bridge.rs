//! Async front end over a blocking [`EntropySource`].

use super::pool::WorkerPool;
use super::task::{CancelFlag, EntropyTask};
use crate::backend::BackendFactory;
use crate::error::{EntropyError, Result};
use crate::shaping::{self, EntropyRequest, RangeRequest};
use crate::source::EntropySource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Default number of worker threads. One worker keeps requests in
/// submission order.
pub const DEFAULT_WORKERS: usize = 1;

/// Runs entropy requests on a bounded pool of blocking workers.
///
/// Arguments are validated on the calling thread, so a bad request fails
/// without touching the pool or the backend. Every other request becomes
/// an [`EntropyTask`] that resolves once a worker has served it.
///
/// Bridge and synchronous callers share the same [`EntropySource`] and
/// therefore the same backend handle. After [`shutdown`](Self::shutdown)
/// both paths fail with [`EntropyError::ShutdownFailure`].
pub struct AsyncBridge<F: BackendFactory + 'static> {
    source: Arc<EntropySource<F>>,
    pool: WorkerPool,
    shut_down: AtomicBool,
}

impl<F: BackendFactory + 'static> AsyncBridge<F> {
    /// Starts a bridge with [`DEFAULT_WORKERS`] workers.
    pub fn new(source: EntropySource<F>) -> Result<Self> {
        Self::with_workers(source, DEFAULT_WORKERS)
    }

    /// Starts a bridge with `workers` threads. More than one worker gives
    /// up submission ordering; the backend lock still serializes reads.
    pub fn with_workers(source: EntropySource<F>, workers: usize) -> Result<Self> {
        Self::from_shared(Arc::new(source), workers)
    }

    /// Starts a bridge over a source that synchronous callers also hold.
    pub fn from_shared(source: Arc<EntropySource<F>>, workers: usize) -> Result<Self> {
        let pool = WorkerPool::new(workers)?;
        tracing::info!(workers, "Async bridge started");
        Ok(Self {
            source,
            pool,
            shut_down: AtomicBool::new(false),
        })
    }

    /// The shared synchronous source.
    pub fn source(&self) -> &Arc<EntropySource<F>> {
        &self.source
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// True once shutdown has begun.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Serves a byte or bit request on the pool.
    ///
    /// A shut-down bridge reports [`EntropyError::ShutdownFailure`] even for
    /// requests that would also fail validation.
    pub fn request(&self, request: EntropyRequest) -> EntropyTask<Vec<u8>> {
        if self.is_shut_down() {
            return EntropyTask::failed(EntropyError::ShutdownFailure);
        }
        if let Err(e) = request.validate(&self.source.capabilities()) {
            return EntropyTask::failed(e);
        }
        self.dispatch(move |source| source.read(&request))
    }

    /// Exactly `n` bytes.
    pub fn read_bytes(&self, n: usize) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::bytes(n))
    }

    /// `ceil(n/8)` bytes; tail bits left as produced.
    pub fn read_bits(&self, n: usize) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::bits(n))
    }

    /// `ceil(n/8)` bytes with the unused tail bits zeroed.
    pub fn read_exact_bits(&self, n: usize) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::exact_bits(n))
    }

    /// Exactly `n` bytes, each XOR-folded from `2^folds` raw bytes.
    pub fn read_bytes_folded(&self, n: usize, folds: u32) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::bytes(n).with_folds(folds))
    }

    /// Folded counterpart of [`read_bits`](Self::read_bits).
    pub fn read_bits_folded(&self, n: usize, folds: u32) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::bits(n).with_folds(folds))
    }

    /// Folded counterpart of [`read_exact_bits`](Self::read_exact_bits).
    pub fn read_exact_bits_folded(&self, n: usize, folds: u32) -> EntropyTask<Vec<u8>> {
        self.request(EntropyRequest::exact_bits(n).with_folds(folds))
    }

    /// Draws an integer on the pool. Shutdown takes precedence over
    /// validation, as in [`request`](Self::request).
    pub fn sample(&self, request: RangeRequest, folds: u32) -> EntropyTask<i64> {
        if self.is_shut_down() {
            return EntropyTask::failed(EntropyError::ShutdownFailure);
        }
        if let Err(e) = shaping::validate_sample(&request, folds, &self.source.capabilities()) {
            return EntropyTask::failed(e);
        }
        self.dispatch(move |source| source.sample(&request, folds))
    }

    /// Uniform integer in `[min, max)`, or a raw `u32` when `max` is `None`.
    pub fn sample_int(&self, min: i64, max: Option<i64>) -> EntropyTask<i64> {
        self.sample(RangeRequest { min, max }, 0)
    }

    /// Folded counterpart of [`sample_int`](Self::sample_int).
    pub fn sample_int_folded(&self, min: i64, max: Option<i64>, folds: u32) -> EntropyTask<i64> {
        self.sample(RangeRequest { min, max }, folds)
    }

    /// Probes the backend on the pool, behind any queued reads.
    pub fn probe(&self) -> EntropyTask<bool> {
        self.dispatch(|source| Ok(source.probe()))
    }

    /// Resets the backend on the pool, behind any queued reads.
    pub fn reset(&self) -> EntropyTask<()> {
        self.dispatch(|source| {
            source.reset();
            Ok(())
        })
    }

    /// Stops accepting work, waits for queued and in-flight requests to
    /// finish, then closes the backend. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.begin_shutdown() {
            return;
        }
        self.pool.join().await;
        self.finish_shutdown();
    }

    /// Blocking counterpart of [`shutdown`](Self::shutdown) for callers
    /// outside an async runtime.
    pub fn shutdown_blocking(&self) {
        if !self.begin_shutdown() {
            return;
        }
        self.pool.join_blocking();
        self.finish_shutdown();
    }

    fn begin_shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("Async bridge already shut down");
            return false;
        }
        tracing::info!("Shutting down async bridge");
        self.pool.close_queue();
        true
    }

    fn finish_shutdown(&self) {
        self.source.close();
        tracing::info!("Async bridge shut down");
    }

    fn dispatch<T, Op>(&self, op: Op) -> EntropyTask<T>
    where
        T: Send + 'static,
        Op: FnOnce(&EntropySource<F>) -> Result<T> + Send + 'static,
    {
        if self.is_shut_down() {
            return EntropyTask::failed(EntropyError::ShutdownFailure);
        }

        let metrics = self.source.metrics().cloned();
        let (tx, rx) = oneshot::channel();
        let flag = CancelFlag::new(metrics.clone());

        let job_flag = Arc::clone(&flag);
        let job_metrics = metrics.clone();
        let source = Arc::clone(&self.source);
        let job = Box::new(move || {
            if let Some(metrics) = &job_metrics {
                metrics.queue_depth.dec();
            }
            if job_flag.is_cancelled() || tx.is_closed() {
                tracing::debug!("Skipping cancelled request");
                return;
            }
            // The caller may have gone away meanwhile; the result is dropped.
            let _ = tx.send(op(&source));
        });

        if let Some(metrics) = &metrics {
            metrics.tasks_submitted_total.inc();
            metrics.queue_depth.inc();
        }
        match self.pool.submit(job) {
            Ok(()) => EntropyTask::pending(rx, flag),
            Err(e) => {
                if let Some(metrics) = &metrics {
                    metrics.queue_depth.dec();
                }
                EntropyTask::failed(e)
            }
        }
    }
}

impl<F: BackendFactory + 'static> Drop for AsyncBridge<F> {
    fn drop(&mut self) {
        // Workers drain what is queued and exit on their own.
        if !self.is_shut_down() {
            self.pool.close_queue();
        }
    }
}

impl<F: BackendFactory + 'static> std::fmt::Debug for AsyncBridge<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBridge")
            .field("workers", &self.workers())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
