//! Awaitable handle for a request running on the worker pool.

use crate::error::{EntropyError, Result};
use crate::metrics::MetricsRegistry;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Shared cancellation state between a task and its queued job.
///
/// Cancelling wakes whoever is awaiting the task.
#[derive(Debug)]
pub(crate) struct CancelFlag {
    token: CancellationToken,
    counted: AtomicBool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl CancelFlag {
    pub(crate) fn new(metrics: Option<Arc<MetricsRegistry>>) -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            counted: AtomicBool::new(false),
            metrics,
        })
    }

    pub(crate) fn cancel(&self) {
        if !self.counted.swap(true, Ordering::AcqRel) {
            if let Some(metrics) = &self.metrics {
                metrics.tasks_cancelled_total.inc();
            }
        }
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn cancelled(&self) -> Pin<Box<WaitForCancellationFutureOwned>> {
        Box::pin(self.token.clone().cancelled_owned())
    }
}

/// Cancels an [`EntropyTask`] from elsewhere, e.g. while it is being awaited.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<CancelFlag>,
}

impl CancelHandle {
    /// Cancels the task.
    pub fn cancel(&self) {
        self.flag.cancel();
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.is_cancelled()
    }
}

enum TaskState<T> {
    Ready(Option<Result<T>>),
    Pending {
        rx: oneshot::Receiver<Result<T>>,
        flag: Arc<CancelFlag>,
        cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    },
    Done,
}

/// Pending result of an asynchronous entropy request.
///
/// Cancelling before a worker picks the job up means it never reaches the
/// backend. Cancelling after dispatch lets the read finish and discards
/// its result. Either way the task resolves to [`EntropyError::Cancelled`]
/// as soon as cancellation is requested, without waiting for the worker.
/// Dropping the task cancels it.
#[must_use = "dropping an EntropyTask cancels it"]
pub struct EntropyTask<T> {
    state: TaskState<T>,
    handle: Option<CancelHandle>,
}

// No field is structurally pinned.
impl<T> Unpin for EntropyTask<T> {}

impl<T> EntropyTask<T> {
    pub(crate) fn pending(rx: oneshot::Receiver<Result<T>>, flag: Arc<CancelFlag>) -> Self {
        Self {
            handle: Some(CancelHandle {
                flag: Arc::clone(&flag),
            }),
            state: TaskState::Pending {
                rx,
                cancelled: flag.cancelled(),
                flag,
            },
        }
    }

    /// A task that failed before dispatch.
    pub(crate) fn failed(err: EntropyError) -> Self {
        Self {
            state: TaskState::Ready(Some(Err(err))),
            handle: None,
        }
    }

    /// Requests cancellation. Has no effect once the task has resolved.
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.cancel();
        }
    }

    /// Returns a handle that can cancel this task while it is awaited.
    ///
    /// Tasks that failed validation return `None`.
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.handle.clone()
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.handle.as_ref().is_some_and(CancelHandle::is_cancelled)
    }
}

impl<T> Future for EntropyTask<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let output = match &mut this.state {
            TaskState::Ready(result) => result.take().unwrap_or(Err(EntropyError::Cancelled)),
            TaskState::Pending { rx, flag, cancelled } => {
                if cancelled.as_mut().poll(cx).is_ready() {
                    Err(EntropyError::Cancelled)
                } else {
                    match Pin::new(rx).poll(cx) {
                        Poll::Pending => return Poll::Pending,
                        // Result arrived but cancellation won the race.
                        Poll::Ready(Ok(_)) if flag.is_cancelled() => Err(EntropyError::Cancelled),
                        Poll::Ready(Ok(result)) => result,
                        // The job was dropped without running.
                        Poll::Ready(Err(_)) => Err(EntropyError::ShutdownFailure),
                    }
                }
            }
            TaskState::Done => Err(EntropyError::Cancelled),
        };
        this.state = TaskState::Done;
        Poll::Ready(output)
    }
}

impl<T> Drop for EntropyTask<T> {
    fn drop(&mut self) {
        if let TaskState::Pending { flag, .. } = &self.state {
            flag.cancel();
        }
    }
}

impl<T> std::fmt::Debug for EntropyTask<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            TaskState::Ready(_) => "ready",
            TaskState::Pending { .. } => "pending",
            TaskState::Done => "done",
        };
        f.debug_struct("EntropyTask")
            .field("state", &state)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_task_resolves_immediately() {
        let task: EntropyTask<u8> =
            EntropyTask::failed(EntropyError::invalid("n must be positive"));
        assert!(task.cancel_handle().is_none());
        assert!(matches!(task.await, Err(EntropyError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_delivered_result() {
        let (tx, rx) = oneshot::channel();
        let task = EntropyTask::pending(rx, CancelFlag::new(None));
        tx.send(Ok(7u8)).unwrap();
        assert_eq!(task.await, Ok(7));
    }

    #[tokio::test]
    async fn test_cancel_discards_delivered_result() {
        let (tx, rx) = oneshot::channel();
        let task = EntropyTask::pending(rx, CancelFlag::new(None));
        tx.send(Ok(7u8)).unwrap();
        task.cancel();
        assert!(task.is_cancelled());
        assert_eq!(task.await, Err(EntropyError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropped_sender_is_shutdown() {
        let (tx, rx) = oneshot::channel::<Result<u8>>();
        let task = EntropyTask::pending(rx, CancelFlag::new(None));
        drop(tx);
        assert_eq!(task.await, Err(EntropyError::ShutdownFailure));
    }

    #[tokio::test]
    async fn test_cancel_wakes_awaiting_task() {
        let (_tx, rx) = oneshot::channel::<Result<u8>>();
        let task = EntropyTask::pending(rx, CancelFlag::new(None));
        let handle = task.cancel_handle().unwrap();

        let waiter = tokio::spawn(task);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.cancel();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("cancelled task never woke")
            .unwrap();
        assert_eq!(outcome, Err(EntropyError::Cancelled));
    }

    #[test]
    fn test_drop_sets_flag_and_counts_once() {
        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let flag = CancelFlag::new(Some(Arc::clone(&metrics)));
        let (_tx, rx) = oneshot::channel::<Result<u8>>();

        let task = EntropyTask::pending(rx, Arc::clone(&flag));
        task.cancel();
        drop(task);

        assert!(flag.is_cancelled());
        assert_eq!(metrics.snapshot().tasks_cancelled, 1);
    }
}
