//! Lazily constructed, resettable backend slot.

use crate::backend::{Backend, BackendFactory, Capabilities};
use crate::error::{EntropyError, Result};
use crate::metrics::MetricsRegistry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observable state of a [`LifecycleManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No handle; the next request builds one.
    Uninitialized,
    /// A live handle exists.
    Active,
    /// Closed for good until an explicit reset.
    Closed,
}

enum Slot<B> {
    Uninitialized,
    Active(B),
    Closed,
}

impl<B> Slot<B> {
    fn state(&self) -> LifecycleState {
        match self {
            Slot::Uninitialized => LifecycleState::Uninitialized,
            Slot::Active(_) => LifecycleState::Active,
            Slot::Closed => LifecycleState::Closed,
        }
    }
}

/// Owns the backend handle of one entropy source.
///
/// The lock is held for the whole of each [`with_backend`](Self::with_backend)
/// call, so two raw reads never interleave on one physical stream.
pub struct LifecycleManager<F: BackendFactory> {
    factory: F,
    slot: Mutex<Slot<F::Backend>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<F: BackendFactory> LifecycleManager<F> {
    /// Creates an `Uninitialized` manager; nothing is built yet.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot::Uninitialized),
            metrics: None,
        }
    }

    /// Records builds, resets and backend errors into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Capabilities declared by the factory.
    pub fn capabilities(&self) -> Capabilities {
        self.factory.capabilities()
    }

    /// Current state, without building anything.
    pub fn state(&self) -> LifecycleState {
        self.lock().state()
    }

    /// Runs `f` against the live handle, building it first if needed.
    ///
    /// A failed build leaves the manager `Uninitialized` and is reported as
    /// `DeviceUnavailable`. A handle that reports itself unavailable mid-read
    /// is torn down so the next request rebuilds it.
    pub fn with_backend<T>(&self, f: impl FnOnce(&mut F::Backend) -> Result<T>) -> Result<T> {
        let mut slot = self.lock();

        if let Slot::Uninitialized = *slot {
            let backend = self.build()?;
            *slot = Slot::Active(backend);
        }
        let backend = match &mut *slot {
            Slot::Active(backend) => backend,
            Slot::Closed | Slot::Uninitialized => return Err(EntropyError::ShutdownFailure),
        };

        let result = f(backend);
        if let Err(e) = &result {
            if let Some(metrics) = &self.metrics {
                metrics.backend_errors_total.inc();
            }
            tracing::warn!(backend = backend.name(), error = %e, "Backend request failed");
            if e.is_unavailable() {
                backend.teardown();
                *slot = Slot::Uninitialized;
            }
        }
        result
    }

    /// Liveness check. Builds the handle if needed; never errors.
    pub fn probe(&self) -> bool {
        let mut slot = self.lock();
        if let Slot::Uninitialized = *slot {
            match self.build() {
                Ok(backend) => *slot = Slot::Active(backend),
                Err(_) => return false,
            }
        }
        match &mut *slot {
            Slot::Active(backend) => backend.probe(),
            Slot::Closed | Slot::Uninitialized => false,
        }
    }

    /// Tears down the current handle, if any, and returns to `Uninitialized`.
    ///
    /// Idempotent; also reopens a closed manager.
    pub fn reset(&self) {
        let mut slot = self.lock();
        let previous = std::mem::replace(&mut *slot, Slot::Uninitialized);
        match previous {
            Slot::Active(mut backend) => {
                backend.teardown();
                if let Some(metrics) = &self.metrics {
                    metrics.resets_total.inc();
                }
                tracing::info!(backend = backend.name(), "Backend reset");
            }
            Slot::Closed => tracing::info!("Closed backend slot reopened"),
            Slot::Uninitialized => {}
        }
    }

    /// Tears down the current handle and refuses further requests.
    ///
    /// Idempotent. Only [`reset`](Self::reset) leaves the closed state.
    pub fn close(&self) {
        let mut slot = self.lock();
        if let Slot::Active(backend) = &mut *slot {
            backend.teardown();
            tracing::info!(backend = backend.name(), "Backend closed");
        }
        *slot = Slot::Closed;
    }

    fn build(&self) -> Result<F::Backend> {
        match self.factory.build() {
            Ok(backend) => {
                if let Some(metrics) = &self.metrics {
                    metrics.backend_builds_total.inc();
                }
                tracing::info!(backend = backend.name(), "Backend constructed");
                Ok(backend)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend construction failed");
                Err(match e {
                    EntropyError::DeviceUnavailable(_) => e,
                    other => EntropyError::DeviceUnavailable(other.to_string()),
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<F::Backend>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: BackendFactory> Drop for LifecycleManager<F> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Active(backend) = slot {
            backend.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockFactory};

    fn read(manager: &LifecycleManager<MockFactory>, n: usize) -> Result<Vec<u8>> {
        manager.with_backend(|b| b.raw_read(n))
    }

    #[test]
    fn test_lazy_construction() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());

        assert_eq!(manager.state(), LifecycleState::Uninitialized);
        assert_eq!(factory.stats().builds(), 0);

        read(&manager, 4).unwrap();
        read(&manager, 4).unwrap();

        assert_eq!(manager.state(), LifecycleState::Active);
        assert_eq!(factory.stats().builds(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let factory = MockFactory::new();
        factory.set_build_failure(true);
        let manager = LifecycleManager::new(factory.clone());

        assert!(read(&manager, 1).unwrap_err().is_unavailable());
        assert_eq!(manager.state(), LifecycleState::Uninitialized);
        assert!(!manager.probe());

        factory.set_build_failure(false);
        assert!(read(&manager, 1).is_ok());
        assert_eq!(manager.state(), LifecycleState::Active);
    }

    #[test]
    fn test_reset_builds_new_handle() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());

        let first = manager.with_backend(|b: &mut MockBackend| Ok(b.generation())).unwrap();
        manager.reset();
        assert_eq!(manager.state(), LifecycleState::Uninitialized);
        let second = manager.with_backend(|b: &mut MockBackend| Ok(b.generation())).unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(factory.stats().teardowns(), 1);
        // Counter restarts with the fresh handle.
        assert_eq!(read(&manager, 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());

        manager.reset();
        read(&manager, 1).unwrap();
        manager.reset();
        manager.reset();

        assert_eq!(factory.stats().teardowns(), 1);
        assert_eq!(manager.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn test_close_refuses_until_reset() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());
        read(&manager, 1).unwrap();

        manager.close();
        manager.close();
        assert_eq!(manager.state(), LifecycleState::Closed);
        assert_eq!(read(&manager, 1), Err(EntropyError::ShutdownFailure));
        assert!(!manager.probe());
        assert_eq!(factory.stats().teardowns(), 1);

        manager.reset();
        assert!(read(&manager, 1).is_ok());
    }

    #[test]
    fn test_vanished_device_is_rebuilt() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());

        let result = manager.with_backend(|_| -> Result<()> {
            Err(EntropyError::DeviceUnavailable("unplugged".into()))
        });
        assert!(result.is_err());
        assert_eq!(manager.state(), LifecycleState::Uninitialized);

        read(&manager, 1).unwrap();
        assert_eq!(factory.stats().builds(), 2);
    }

    #[test]
    fn test_io_failure_keeps_handle() {
        let factory = MockFactory::new();
        let manager = LifecycleManager::new(factory.clone());
        read(&manager, 1).unwrap();

        factory.set_read_failure(true);
        assert!(matches!(read(&manager, 1), Err(EntropyError::IoFailure(_))));
        assert_eq!(manager.state(), LifecycleState::Active);
        assert_eq!(factory.stats().builds(), 1);
    }

    #[test]
    fn test_drop_tears_down() {
        let factory = MockFactory::new();
        {
            let manager = LifecycleManager::new(factory.clone());
            read(&manager, 1).unwrap();
        }
        assert_eq!(factory.stats().teardowns(), 1);
    }
}
