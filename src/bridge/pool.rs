//! Bounded pool of blocking worker threads.
//!
//! Jobs travel over a single FIFO channel. With one worker they run
//! strictly in submission order. Closing the queue lets the workers drain
//! what was already submitted and then exit.

use crate::error::{EntropyError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

struct Worker {
    handle: JoinHandle<()>,
    exited: oneshot::Receiver<()>,
}

pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<Worker>>,
    size: usize,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(EntropyError::invalid("worker pool size must be positive"));
        }

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let receiver = Arc::clone(&receiver);
            let (exit_tx, exited) = oneshot::channel();
            let handle = std::thread::Builder::new()
                .name(format!("rng-worker-{id}"))
                .spawn(move || {
                    run_worker(id, &receiver);
                    let _ = exit_tx.send(());
                })
                .map_err(|e| EntropyError::IoFailure(format!("spawn worker {id}: {e}")))?;
            workers.push(Worker { handle, exited });
        }

        tracing::debug!(size, "Worker pool started");
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Queues a job. Fails with `ShutdownFailure` once the queue is closed.
    pub(crate) fn submit(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| EntropyError::ShutdownFailure),
            None => Err(EntropyError::ShutdownFailure),
        }
    }

    /// Stops accepting jobs. Already queued jobs still run.
    pub(crate) fn close_queue(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Waits for every worker to drain the queue and exit.
    ///
    /// Requires [`close_queue`](Self::close_queue) first. A second call
    /// returns immediately.
    pub(crate) async fn join(&self) {
        let workers = self.take_workers();
        for worker in workers {
            let _ = worker.exited.await;
            let _ = worker.handle.join();
        }
    }

    /// Blocking counterpart of [`join`](Self::join).
    pub(crate) fn join_blocking(&self) {
        for worker in self.take_workers() {
            let _ = worker.handle.join();
        }
    }

    fn take_workers(&self) -> Vec<Worker> {
        std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

fn run_worker(id: usize, receiver: &Mutex<mpsc::Receiver<Job>>) {
    loop {
        let job = receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        let Ok(job) = job else {
            break;
        };
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(worker = id, "Entropy job panicked");
        }
    }
    tracing::debug!(worker = id, "Worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(EntropyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_single_worker_runs_in_submission_order() {
        let pool = WorkerPool::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..20 {
            let order = Arc::clone(&order);
            pool.submit(Box::new(move || order.lock().unwrap().push(i)))
                .unwrap();
        }
        pool.close_queue();
        pool.join_blocking();

        assert_eq!(*order.lock().unwrap(), (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_closed_queue_drains_then_refuses() {
        let pool = WorkerPool::new(2).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let ran = Arc::clone(&ran);
            pool.submit(Box::new(move || {
                std::thread::sleep(std::time::Duration::from_millis(5));
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        pool.close_queue();

        assert!(matches!(
            pool.submit(Box::new(|| {})),
            Err(EntropyError::ShutdownFailure)
        ));
        pool.join_blocking();
        pool.join_blocking();
        assert_eq!(ran.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        pool.submit(Box::new(|| panic!("boom"))).unwrap();
        let counter = Arc::clone(&ran);
        pool.submit(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pool.close_queue();
        pool.join_blocking();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
