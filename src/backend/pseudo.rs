//! Software fallback backend.
//!
//! A ChaCha20 CSPRNG seeded from the operating system. It is always present,
//! which makes it the usual last link in a caller's fallback chain.

use super::{Backend, BackendFactory, Capabilities, ExactBitsPolicy};
use crate::error::Result;
use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore, SeedableRng};

/// Configuration for the software backend.
#[derive(Debug, Clone, Default)]
pub struct PseudoConfig {
    /// Fixed seed. `None` seeds every new handle from OS entropy.
    seed: Option<[u8; 32]>,
}

impl PseudoConfig {
    /// Seeds each handle from the operating system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reproducible configuration (for testing only).
    ///
    /// Every handle built from it replays the same stream.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self { seed: Some(seed) }
    }
}

impl BackendFactory for PseudoConfig {
    type Backend = PseudoBackend;

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(ExactBitsPolicy::Masked, false)
    }

    fn build(&self) -> Result<PseudoBackend> {
        let inner = match self.seed {
            Some(seed) => ChaCha20Rng::from_seed(seed),
            None => {
                let mut seed = [0u8; 32];
                OsRng.fill_bytes(&mut seed);
                ChaCha20Rng::from_seed(seed)
            }
        };
        tracing::debug!(seeded = self.seed.is_some(), "Pseudo backend ready");
        Ok(PseudoBackend { inner })
    }
}

/// ChaCha20-backed handle.
pub struct PseudoBackend {
    inner: ChaCha20Rng,
}

impl Backend for PseudoBackend {
    fn name(&self) -> &'static str {
        "pseudo"
    }

    fn probe(&mut self) -> bool {
        true
    }

    fn raw_read(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.inner.fill_bytes(&mut buf);
        Ok(buf)
    }

    fn teardown(&mut self) {}
}
