//! Unbiased ranged integers via rejection sampling.
//!
//! Candidates are drawn from the smallest power-of-two range covering the
//! target and out-of-range draws are discarded, never reduced modulo the
//! range. Acceptance per draw is above one half, so the expected number of
//! draws is below two.

use super::bits::bytes_for_bits;
use super::RawRead;
use crate::error::{EntropyError, Result};

/// Bounds for an integer sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    /// Inclusive lower bound.
    pub min: i64,
    /// Exclusive upper bound; `None` asks for a raw 32-bit value.
    pub max: Option<i64>,
}

impl RangeRequest {
    /// Uniform integer in `[min, max)`.
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    /// A raw unsigned 32-bit value.
    pub fn unbounded() -> Self {
        Self { min: 0, max: None }
    }

    /// Rejects `min >= max`, and a negative `min` when `max` is absent.
    pub fn validate(&self) -> Result<()> {
        match self.max {
            None if self.min < 0 => Err(EntropyError::invalid(format!(
                "min must be non-negative when max is absent, got {}",
                self.min
            ))),
            Some(max) if self.min >= max => Err(EntropyError::invalid(format!(
                "min must be less than max, got min={}, max={max}",
                self.min
            ))),
            _ => Ok(()),
        }
    }

    /// Raw bytes one candidate draw consumes: 4 for an unbounded request,
    /// otherwise enough bytes to hold `bits_needed` of the range.
    pub fn draw_len(&self) -> usize {
        match self.max {
            None => 4,
            Some(max) => bytes_for_bits(bits_needed(self.span(max)) as usize),
        }
    }

    /// Width of the range, `max - min`.
    fn span(&self, max: i64) -> u64 {
        max.abs_diff(self.min)
    }
}

/// Smallest bit width whose range covers `range_size` values, at least 1.
pub fn bits_needed(range_size: u64) -> u32 {
    if range_size <= 1 {
        1
    } else {
        u64::BITS - (range_size - 1).leading_zeros()
    }
}

/// Draws an integer according to `request`.
pub fn sample<R: RawRead + ?Sized>(src: &mut R, request: &RangeRequest) -> Result<i64> {
    sample_counted(src, request).map(|(value, _)| value)
}

/// Like [`sample`], also returning how many draws were rejected.
pub(crate) fn sample_counted<R: RawRead + ?Sized>(
    src: &mut R,
    request: &RangeRequest,
) -> Result<(i64, u64)> {
    request.validate()?;

    let nbytes = request.draw_len();
    let Some(max) = request.max else {
        let raw = src.read_raw(nbytes)?;
        let value = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        return Ok((i64::from(value), 0));
    };

    let range_size = request.span(max);
    let bits = bits_needed(range_size);
    let mask = u64::MAX >> (u64::BITS - bits);

    let mut rejected = 0u64;
    loop {
        let candidate = draw(src, nbytes)? & mask;
        if candidate < range_size {
            // Exact: the true sum lies in [min, max).
            return Ok((request.min.wrapping_add(candidate as i64), rejected));
        }
        rejected += 1;
        tracing::trace!(candidate, range_size, rejected, "Rejected out-of-range draw");
    }
}

/// Reads `nbytes` fresh bytes as a big-endian integer.
fn draw<R: RawRead + ?Sized>(src: &mut R, nbytes: usize) -> Result<u64> {
    let raw = src.read_raw(nbytes)?;
    Ok(raw.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::chi_square;
    use crate::backend::{BackendFactory, MockFactory, PseudoConfig};
    use crate::shaping::Whitened;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 1);
        assert_eq!(bits_needed(3), 2);
        assert_eq!(bits_needed(4), 2);
        assert_eq!(bits_needed(5), 3);
        assert_eq!(bits_needed(256), 8);
        assert_eq!(bits_needed(257), 9);
        assert_eq!(bits_needed(u64::MAX), 64);
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(RangeRequest::new(10, 5).validate().is_err());
        assert!(RangeRequest::new(5, 5).validate().is_err());
        assert!(RangeRequest { min: -1, max: None }.validate().is_err());
        assert!(RangeRequest::new(-10, -5).validate().is_ok());
    }

    #[test]
    fn test_invalid_range_reads_nothing() {
        let factory = MockFactory::new();
        let mut backend = factory.build().unwrap();
        let result = sample(&mut Whitened::new(&mut backend, 0), &RangeRequest::new(3, 3));
        assert!(matches!(result, Err(EntropyError::InvalidArgument(_))));
        assert_eq!(factory.stats().reads(), 0);
    }

    #[test]
    fn test_rejected_draws_are_not_reused() {
        // range 5 needs 3 bits: 7, 6 and 5 are rejected, 4 is accepted
        let factory = MockFactory::new().with_script([0xFF, 0x0E, 0x05, 0x04, 0x00]);
        let mut backend = factory.build().unwrap();

        let (value, rejected) =
            sample_counted(&mut Whitened::new(&mut backend, 0), &RangeRequest::new(100, 105))
                .unwrap();

        assert_eq!(value, 104);
        assert_eq!(rejected, 3);
        assert_eq!(factory.stats().read_sizes(), vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_unbounded_is_big_endian_u32() {
        let factory = MockFactory::new().with_script([0xDE, 0xAD, 0xBE, 0xEF]);
        let mut backend = factory.build().unwrap();
        let value = sample(&mut Whitened::new(&mut backend, 0), &RangeRequest::unbounded());
        assert_eq!(value.unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_extreme_range() {
        let mut backend = PseudoConfig::with_seed([3u8; 32]).build().unwrap();
        let mut src = Whitened::new(&mut backend, 0);
        for _ in 0..100 {
            let v = sample(&mut src, &RangeRequest::new(i64::MIN, i64::MAX)).unwrap();
            assert!(v < i64::MAX);
        }
    }

    fn histogram(min: i64, max: i64, trials: usize, seed: u8) -> Vec<u64> {
        let mut backend = PseudoConfig::with_seed([seed; 32]).build().unwrap();
        let mut src = Whitened::new(&mut backend, 0);
        let mut counts = vec![0u64; (max - min) as usize];
        for _ in 0..trials {
            let v = sample(&mut src, &RangeRequest::new(min, max)).unwrap();
            assert!((min..max).contains(&v));
            counts[(v - min) as usize] += 1;
        }
        counts
    }

    #[test]
    fn test_small_range_uniform() {
        let counts = histogram(3, 13, 20_000, 11);
        // df = 9, p = 0.001 critical value 27.88
        assert!(chi_square(&counts) < 27.88, "counts: {counts:?}");
    }

    #[test]
    fn test_multi_byte_range_uniform() {
        // 300 is neither a power of two nor byte-aligned in bits.
        let counts = histogram(-150, 150, 60_000, 29);
        // df = 299, p = 0.001 critical value is roughly 377
        assert!(chi_square(&counts) < 400.0);
    }

    #[test]
    fn test_expected_draws_below_two() {
        let mut backend = PseudoConfig::with_seed([5u8; 32]).build().unwrap();
        let mut src = Whitened::new(&mut backend, 0);
        let trials = 10_000u64;

        // 129 values in 8 bits: worst acceptance rate for that width
        let rejected: u64 = (0..trials)
            .map(|_| sample_counted(&mut src, &RangeRequest::new(0, 129)).unwrap().1)
            .sum();
        let mean_draws = (trials + rejected) as f64 / trials as f64;

        assert!(mean_draws < 2.1, "mean draws {mean_draws}");
        assert!(mean_draws > 1.8, "mean draws {mean_draws}");
    }
}
