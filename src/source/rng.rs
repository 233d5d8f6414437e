//! `rand_core` adapter.

use super::EntropySource;
use crate::backend::BackendFactory;
use rand_core::RngCore;

/// Exposes an [`EntropySource`] as a [`RngCore`].
///
/// Every call is a blocking backend read. The infallible `RngCore` methods
/// panic if the source fails; use `try_fill_bytes` to observe errors.
pub struct EntropyRng<'a, F: BackendFactory> {
    source: &'a EntropySource<F>,
}

impl<'a, F: BackendFactory> EntropyRng<'a, F> {
    /// Wraps a borrowed source.
    pub fn new(source: &'a EntropySource<F>) -> Self {
        Self { source }
    }
}

impl<F: BackendFactory> RngCore for EntropyRng<'_, F> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = self.try_fill_bytes(dest) {
            panic!("entropy source failed: {e}");
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        if dest.is_empty() {
            return Ok(());
        }
        let data = self
            .source
            .read_bytes(dest.len())
            .map_err(rand_core::Error::new)?;
        dest.copy_from_slice(&data);
        Ok(())
    }
}
