//! Entropy testing.
//!
//! This module provides statistical tests used by the self test and by
//! the uniformity checks on the range sampler. These are sanity checks,
//! not cryptographic proofs of entropy.

mod statistics;
mod threshold;

pub use statistics::{bit_bias, chi_square, StatisticalTests};
pub use threshold::{QualityThresholds, ThresholdViolation};
