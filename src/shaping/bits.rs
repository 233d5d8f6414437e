//! Byte, bit and exact-bit shaping.

use super::RawRead;
use crate::backend::ExactBitsPolicy;
use crate::error::{EntropyError, Result};

/// Bytes needed to hold `n` bits.
#[inline]
pub fn bytes_for_bits(n: usize) -> usize {
    n.div_ceil(8)
}

/// Reads exactly `n` bytes.
pub fn to_bytes<R: RawRead + ?Sized>(src: &mut R, n: usize) -> Result<Vec<u8>> {
    if n == 0 {
        return Err(EntropyError::invalid("byte count must be positive, got 0"));
    }
    src.read_raw(n)
}

/// Reads at least `n` bits, rounded up to whole bytes.
///
/// The trailing `8 * ceil(n/8) - n` bits are whatever the source produced.
pub fn to_bits<R: RawRead + ?Sized>(src: &mut R, n: usize) -> Result<Vec<u8>> {
    if n == 0 {
        return Err(EntropyError::invalid("bit count must be positive, got 0"));
    }
    src.read_raw(bytes_for_bits(n))
}

/// Reads exactly `n` meaningful bits.
///
/// The buffer is `ceil(n/8)` bytes long. When `n` is not byte-aligned the
/// high-order `8 - n % 8` bits of the final byte are zero; bits are not
/// repacked across bytes. Byte-aligned backends reject such `n` outright.
pub fn to_exact_bits<R: RawRead + ?Sized>(
    src: &mut R,
    n: usize,
    policy: ExactBitsPolicy,
) -> Result<Vec<u8>> {
    if n == 0 {
        return Err(EntropyError::invalid("bit count must be positive, got 0"));
    }
    if policy == ExactBitsPolicy::ByteAligned && n % 8 != 0 {
        return Err(EntropyError::invalid(format!(
            "bit count must be divisible by 8, got {n}"
        )));
    }
    let mut data = src.read_raw(bytes_for_bits(n))?;
    mask_tail(&mut data, n);
    Ok(data)
}

/// Zeroes the unused high-order bits of the last byte of an `n_bits` buffer.
pub fn mask_tail(buf: &mut [u8], n_bits: usize) {
    let used = n_bits % 8;
    if used == 0 {
        return;
    }
    if let Some(last) = buf.last_mut() {
        *last &= (1u8 << used) - 1;
    }
}
