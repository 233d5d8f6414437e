//! Entropy shaping: bit truncation, XOR-fold whitening and ranged sampling.
//!
//! Every stage consumes raw bytes through [`RawRead`] and is therefore
//! identical across backends. The pipeline for one request is
//!
//! ```text
//! backend.raw_read ← Whitened (folds) ← bits (truncate/mask) ← range (reject)
//! ```

mod bits;
mod fold;
mod range;

pub use bits::{bytes_for_bits, mask_tail, to_bits, to_bytes, to_exact_bits};
pub use fold::{oversampled_len, xor_fold, Whitened, MAX_RAW_READ};
pub use range::{bits_needed, sample, RangeRequest};

pub(crate) use range::sample_counted;

use crate::backend::Capabilities;
use crate::error::{EntropyError, Result};

/// A source of exactly-sized raw byte reads.
pub trait RawRead {
    /// Returns exactly `n` bytes or fails.
    fn read_raw(&mut self, n: usize) -> Result<Vec<u8>>;
}

/// What shape of output a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `size` bytes.
    Bytes,
    /// `size` bits rounded up to whole bytes, tail left as produced.
    Bits,
    /// `size` bits rounded up to whole bytes, tail zeroed.
    ExactBits,
}

/// A byte or bit request against an entropy source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyRequest {
    /// Output shape.
    pub kind: RequestKind,
    /// Bytes for [`RequestKind::Bytes`], bits otherwise.
    pub size: usize,
    /// XOR-fold passes; each doubles the raw read.
    pub folds: u32,
}

impl EntropyRequest {
    /// `n` bytes.
    pub fn bytes(n: usize) -> Self {
        Self {
            kind: RequestKind::Bytes,
            size: n,
            folds: 0,
        }
    }

    /// `n` bits, tail left as produced.
    pub fn bits(n: usize) -> Self {
        Self {
            kind: RequestKind::Bits,
            size: n,
            folds: 0,
        }
    }

    /// `n` bits, tail zeroed.
    pub fn exact_bits(n: usize) -> Self {
        Self {
            kind: RequestKind::ExactBits,
            size: n,
            folds: 0,
        }
    }

    /// Requests XOR-fold whitening with `folds` halvings.
    pub fn with_folds(mut self, folds: u32) -> Self {
        self.folds = folds;
        self
    }

    /// Number of bytes the caller receives.
    pub fn output_len(&self) -> usize {
        match self.kind {
            RequestKind::Bytes => self.size,
            RequestKind::Bits | RequestKind::ExactBits => bytes_for_bits(self.size),
        }
    }

    /// Checks the request against a backend's capabilities without any I/O.
    pub fn validate(&self, caps: &Capabilities) -> Result<()> {
        if self.size == 0 {
            return Err(EntropyError::invalid("size must be positive, got 0"));
        }
        if self.kind == RequestKind::ExactBits
            && caps.exact_bits == crate::backend::ExactBitsPolicy::ByteAligned
            && self.size % 8 != 0
        {
            return Err(EntropyError::invalid(format!(
                "bit count must be divisible by 8 on this backend, got {}",
                self.size
            )));
        }
        validate_folds(self.folds, caps)?;
        oversampled_len(self.output_len(), self.folds)?;
        Ok(())
    }
}

/// Checks a ranged-integer request without any I/O: bounds, folding
/// capability, and the raw read each whitened draw needs.
pub(crate) fn validate_sample(
    request: &RangeRequest,
    folds: u32,
    caps: &Capabilities,
) -> Result<()> {
    request.validate()?;
    validate_folds(folds, caps)?;
    oversampled_len(request.draw_len(), folds)?;
    Ok(())
}

pub(crate) fn validate_folds(folds: u32, caps: &Capabilities) -> Result<()> {
    if folds > 0 && !caps.folding {
        return Err(EntropyError::invalid(format!(
            "backend does not support folding, got folds={folds}"
        )));
    }
    Ok(())
}

/// Runs a validated request against a raw source.
pub fn fulfil<R: RawRead + ?Sized>(
    src: &mut R,
    request: &EntropyRequest,
    caps: &Capabilities,
) -> Result<Vec<u8>> {
    match request.kind {
        RequestKind::Bytes => to_bytes(src, request.size),
        RequestKind::Bits => to_bits(src, request.size),
        RequestKind::ExactBits => to_exact_bits(src, request.size, caps.exact_bits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExactBitsPolicy;

    #[test]
    fn test_zero_size_rejected() {
        let caps = Capabilities::default();
        assert!(matches!(
            EntropyRequest::bytes(0).validate(&caps),
            Err(EntropyError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_alignment_is_per_backend() {
        let masked = Capabilities::new(ExactBitsPolicy::Masked, false);
        let aligned = Capabilities::new(ExactBitsPolicy::ByteAligned, false);
        let request = EntropyRequest::exact_bits(100);

        assert!(request.validate(&masked).is_ok());
        assert!(request.validate(&aligned).is_err());
        assert!(EntropyRequest::exact_bits(96).validate(&aligned).is_ok());
    }

    #[test]
    fn test_folds_require_capability() {
        let plain = Capabilities::new(ExactBitsPolicy::Masked, false);
        let whitening = Capabilities::new(ExactBitsPolicy::Masked, true);
        let request = EntropyRequest::bytes(16).with_folds(2);

        assert!(request.validate(&plain).is_err());
        assert!(request.validate(&whitening).is_ok());
    }

    #[test]
    fn test_fold_overflow_rejected() {
        let caps = Capabilities::new(ExactBitsPolicy::Masked, true);
        let request = EntropyRequest::bytes(usize::MAX / 2).with_folds(4);
        assert!(request.validate(&caps).is_err());
    }

    #[test]
    fn test_oversized_requests_rejected() {
        let caps = Capabilities::new(ExactBitsPolicy::Masked, true);
        for request in [
            EntropyRequest::bytes(usize::MAX),
            EntropyRequest::bytes(MAX_RAW_READ + 1),
            EntropyRequest::bits(usize::MAX),
            EntropyRequest::bytes(1).with_folds(63),
        ] {
            assert!(
                matches!(request.validate(&caps), Err(EntropyError::InvalidArgument(_))),
                "{request:?}"
            );
        }
        assert!(EntropyRequest::bytes(MAX_RAW_READ).validate(&caps).is_ok());
    }

    #[test]
    fn test_sample_validation_covers_draw_width() {
        let caps = Capabilities::new(ExactBitsPolicy::Masked, true);
        assert!(validate_sample(&RangeRequest::new(0, 10), 29, &caps).is_ok());
        // A 1-byte draw folded 31 times needs 2 GiB.
        assert!(matches!(
            validate_sample(&RangeRequest::new(0, 10), 31, &caps),
            Err(EntropyError::InvalidArgument(_))
        ));
        // 4-byte unbounded draws hit the limit two folds earlier.
        assert!(validate_sample(&RangeRequest::unbounded(), 28, &caps).is_ok());
        assert!(validate_sample(&RangeRequest::unbounded(), 29, &caps).is_err());
    }

    #[test]
    fn test_output_len() {
        assert_eq!(EntropyRequest::bits(100).output_len(), 13);
        assert_eq!(EntropyRequest::bytes(100).output_len(), 100);
    }
}
