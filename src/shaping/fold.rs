//! XOR-fold whitening.
//!
//! Each fold halves the buffer by XOR-ing its two halves together, so after
//! `k` folds every output byte combines `2^k` independent raw bytes. This
//! cancels the systematic bias typical of cheap whitening circuits without
//! a cryptographic hash.

use super::RawRead;
use crate::backend::Backend;
use crate::error::{EntropyError, Result};

/// Largest raw read one request may issue (1 GiB), folding included.
pub const MAX_RAW_READ: usize = 1 << 30;

/// Raw bytes needed to produce `n` bytes after `folds` folds.
///
/// Fails with `InvalidArgument` when the read would exceed [`MAX_RAW_READ`].
pub fn oversampled_len(n: usize, folds: u32) -> Result<usize> {
    1usize
        .checked_shl(folds)
        .and_then(|factor| n.checked_mul(factor))
        .filter(|&len| len <= MAX_RAW_READ)
        .ok_or_else(|| {
            EntropyError::invalid(format!(
                "{n} bytes with {folds} folds exceeds the {MAX_RAW_READ}-byte read limit"
            ))
        })
}

/// Folds `buf` in place `folds` times.
///
/// `buf.len()` must be a multiple of `2^folds`.
pub fn xor_fold(mut buf: Vec<u8>, folds: u32) -> Vec<u8> {
    for _ in 0..folds {
        let half = buf.len() / 2;
        let (front, back) = buf.split_at_mut(half);
        for (a, b) in front.iter_mut().zip(back.iter()) {
            *a ^= *b;
        }
        buf.truncate(half);
    }
    buf
}

/// Raw reads from a backend, whitened by `folds` XOR folds.
///
/// With zero folds this is a plain pass-through.
pub struct Whitened<'a, B: ?Sized> {
    backend: &'a mut B,
    folds: u32,
}

impl<'a, B: Backend + ?Sized> Whitened<'a, B> {
    /// Wraps `backend`, applying `folds` folds to every read.
    pub fn new(backend: &'a mut B, folds: u32) -> Self {
        Self { backend, folds }
    }
}

impl<B: Backend + ?Sized> RawRead for Whitened<'_, B> {
    fn read_raw(&mut self, n: usize) -> Result<Vec<u8>> {
        let raw_len = oversampled_len(n, self.folds)?;
        if self.folds == 0 {
            return self.backend.raw_read(n);
        }
        let raw = self.backend.raw_read(raw_len)?;
        if raw.len() != raw_len {
            return Err(EntropyError::IoFailure(format!(
                "{} returned {} of {raw_len} bytes",
                self.backend.name(),
                raw.len()
            )));
        }
        tracing::debug!(output = n, raw = raw_len, folds = self.folds, "Folding raw entropy");
        Ok(xor_fold(raw, self.folds))
    }
}
