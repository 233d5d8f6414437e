//! Mock backend for testing and demonstrations.
//!
//! Produces a deterministic byte counter (or replays scripted bytes) and
//! counts builds, reads and teardowns so lifecycle behaviour can be
//! observed. NOT an entropy source.

use super::{Backend, BackendFactory, Capabilities, ExactBitsPolicy};
use crate::error::{EntropyError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Counters shared by a [`MockFactory`] and every handle it builds.
#[derive(Debug, Default)]
pub struct MockStats {
    builds: AtomicUsize,
    teardowns: AtomicUsize,
    reads: AtomicUsize,
    read_sizes: Mutex<Vec<usize>>,
}

impl MockStats {
    /// Successful builds.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// Teardowns that actually released a live handle.
    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// `raw_read` calls, failed ones included.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Requested size of every `raw_read` call, in order.
    pub fn read_sizes(&self) -> Vec<usize> {
        self.read_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Builds [`MockBackend`] handles.
#[derive(Debug, Clone)]
pub struct MockFactory {
    capabilities: Capabilities,
    script: Option<Arc<Mutex<VecDeque<u8>>>>,
    read_delay: Option<Duration>,
    fail_build: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    stats: Arc<MockStats>,
}

impl MockFactory {
    /// Counter-pattern mock with masked exact bits and folding support.
    pub fn new() -> Self {
        Self {
            capabilities: Capabilities::new(ExactBitsPolicy::Masked, true),
            script: None,
            read_delay: None,
            fail_build: Arc::new(AtomicBool::new(false)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Overrides the declared capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replays `bytes` across all handles; running out is a short read.
    pub fn with_script(mut self, bytes: impl IntoIterator<Item = u8>) -> Self {
        self.script = Some(Arc::new(Mutex::new(bytes.into_iter().collect())));
        self
    }

    /// Makes every read block for `delay`, like a slow serial device.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Makes subsequent builds fail as if the device were unplugged.
    pub fn set_build_failure(&self, fail: bool) {
        self.fail_build.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent reads fail with an I/O error.
    pub fn set_read_failure(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Shared counters across every handle this factory builds.
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for MockFactory {
    type Backend = MockBackend;

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn build(&self) -> Result<MockBackend> {
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(EntropyError::DeviceUnavailable("mock device unplugged".into()));
        }
        let generation = self.stats.builds.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "MockBackend built");
        Ok(MockBackend {
            factory: self.clone(),
            generation,
            counter: 0,
            open: true,
        })
    }
}

/// Deterministic handle produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockBackend {
    factory: MockFactory,
    generation: usize,
    counter: u8,
    open: bool,
}

impl MockBackend {
    /// Which build of the factory produced this handle (1-based).
    pub fn generation(&self) -> usize {
        self.generation
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn probe(&mut self) -> bool {
        self.open && !self.factory.fail_reads.load(Ordering::SeqCst)
    }

    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>> {
        let stats = &self.factory.stats;
        stats.reads.fetch_add(1, Ordering::SeqCst);
        stats
            .read_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(n);

        if let Some(delay) = self.factory.read_delay {
            std::thread::sleep(delay);
        }
        if !self.open {
            return Err(EntropyError::DeviceUnavailable("mock device closed".into()));
        }
        if self.factory.fail_reads.load(Ordering::SeqCst) {
            return Err(EntropyError::IoFailure("mock read timeout".into()));
        }

        match &self.factory.script {
            Some(script) => {
                let mut script = script.lock().unwrap_or_else(PoisonError::into_inner);
                if script.len() < n {
                    return Err(EntropyError::IoFailure(format!(
                        "short read: expected {n} bytes, got {}",
                        script.len()
                    )));
                }
                Ok(script.drain(..n).collect())
            }
            None => Ok((0..n)
                .map(|_| {
                    let b = self.counter;
                    self.counter = self.counter.wrapping_add(1);
                    b
                })
                .collect()),
        }
    }

    fn teardown(&mut self) {
        if self.open {
            self.open = false;
            self.factory.stats.teardowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_pattern_continues_across_reads() {
        let mut backend = MockFactory::new().build().unwrap();
        assert_eq!(backend.raw_read(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(backend.raw_read(2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_script_exhaustion_is_short_read() {
        let mut backend = MockFactory::new().with_script([9, 8]).build().unwrap();
        assert!(matches!(
            backend.raw_read(3),
            Err(EntropyError::IoFailure(_))
        ));
    }

    #[test]
    fn test_teardown_counted_once() {
        let factory = MockFactory::new();
        let mut backend = factory.build().unwrap();
        backend.teardown();
        backend.teardown();
        assert_eq!(factory.stats().teardowns(), 1);
    }
}
