//! Pass/fail limits for the CLI self test.
//!
//! A violation means "investigate this source", not "this source is
//! broken".

use super::statistics::StatisticalTests;
use serde::{Deserialize, Serialize};

/// Limits applied to [`StatisticalTests`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Largest tolerated |bit bias|.
    pub max_bit_bias: f64,
    /// Smallest tolerated byte variance.
    pub min_variance: f64,
    /// Largest tolerated |lag-1 autocorrelation|.
    pub max_autocorrelation: f64,
    /// Maximum byte-histogram chi-square. 330.5 is the p = 0.001 critical
    /// value for 255 degrees of freedom.
    pub max_byte_chi_square: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self::limits(0.05, 500.0, 0.3, 330.5)
    }
}

impl QualityThresholds {
    fn limits(bias: f64, variance: f64, autocorrelation: f64, chi_square: f64) -> Self {
        Self {
            max_bit_bias: bias,
            min_variance: variance,
            max_autocorrelation: autocorrelation,
            max_byte_chi_square: chi_square,
        }
    }

    /// Tighter limits; the chi-square bound is the p = 0.01 critical value.
    pub fn conservative() -> Self {
        Self::limits(0.02, 1000.0, 0.1, 310.5)
    }

    /// Loose limits that only catch grossly broken sources. Skips the
    /// histogram check, so short samples pass.
    pub fn permissive() -> Self {
        Self::limits(0.2, 100.0, 0.5, f64::INFINITY)
    }

    /// Returns the first limit `stats` breaks, in the order bias,
    /// variance, autocorrelation, histogram.
    pub fn check(&self, stats: &StatisticalTests) -> Result<(), ThresholdViolation> {
        let violations = [
            (stats.bit_bias.abs() > self.max_bit_bias).then_some(ThresholdViolation::BitBias {
                observed: stats.bit_bias,
                threshold: self.max_bit_bias,
            }),
            (stats.variance < self.min_variance).then_some(ThresholdViolation::LowVariance {
                observed: stats.variance,
                threshold: self.min_variance,
            }),
            (stats.autocorrelation.abs() > self.max_autocorrelation).then_some(
                ThresholdViolation::HighAutocorrelation {
                    observed: stats.autocorrelation,
                    threshold: self.max_autocorrelation,
                },
            ),
            (stats.byte_chi_square > self.max_byte_chi_square).then_some(
                ThresholdViolation::NonUniformBytes {
                    observed: stats.byte_chi_square,
                    threshold: self.max_byte_chi_square,
                },
            ),
        ];

        match violations.into_iter().flatten().next() {
            Some(violation) => Err(violation),
            None => Ok(()),
        }
    }
}

/// A self-test limit the sample broke.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ThresholdViolation {
    /// Fraction of one bits strayed too far from one half.
    #[error("bit bias {observed:.4} outside +/-{threshold:.4}")]
    BitBias {
        /// Measured bias, signed.
        observed: f64,
        /// Largest allowed distance.
        threshold: f64,
    },

    /// Byte values were spread too narrowly.
    #[error("byte variance {observed:.2} under {threshold:.2}")]
    LowVariance {
        /// Measured byte variance.
        observed: f64,
        /// Smallest allowed variance.
        threshold: f64,
    },

    /// Neighbouring bytes were correlated.
    #[error("lag-1 autocorrelation {observed:.4} outside +/-{threshold:.4}")]
    HighAutocorrelation {
        /// Measured lag-1 autocorrelation.
        observed: f64,
        /// Largest allowed magnitude.
        threshold: f64,
    },

    /// Byte histogram failed the chi-square test.
    #[error("byte chi-square {observed:.1} over {threshold:.1}")]
    NonUniformBytes {
        /// Measured chi-square statistic.
        observed: f64,
        /// Largest allowed statistic.
        threshold: f64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PseudoConfig;
    use crate::EntropySource;

    #[test]
    fn test_seeded_software_backend_passes() {
        let source = EntropySource::new(PseudoConfig::with_seed([42u8; 32]));
        let stats = StatisticalTests::analyze(&source.read_bytes(64 * 1024).unwrap());

        assert!(QualityThresholds::default().check(&stats).is_ok(), "{stats:?}");
    }

    #[test]
    fn test_stuck_high_reports_bias() {
        let stats = StatisticalTests::analyze(&[0xFFu8; 1000]);

        assert!(matches!(
            QualityThresholds::default().check(&stats),
            Err(ThresholdViolation::BitBias { .. })
        ));
    }

    #[test]
    fn test_counter_reports_autocorrelation() {
        // Balanced bits and wide spread, yet every byte predicts the next.
        let data: Vec<u8> = (0..4096u32).map(|i| i as u8).collect();
        let stats = StatisticalTests::analyze(&data);

        assert!(matches!(
            QualityThresholds::default().check(&stats),
            Err(ThresholdViolation::HighAutocorrelation { .. })
        ));
    }

    #[test]
    fn test_skewed_histogram_reports_non_uniform() {
        // Shuffled so adjacent bytes are uncorrelated, but 0x00..0x7F
        // appear four times as often as 0x80..0xFF.
        let mut data = Vec::with_capacity(64 * 1024);
        let mut state = 0x2545_f491_u32;
        while data.len() < 64 * 1024 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let b = state as u8;
            if b < 0x80 || state >> 30 == 0 {
                data.push(b);
            }
        }
        let stats = StatisticalTests::analyze(&data);
        let relaxed = QualityThresholds {
            max_bit_bias: 0.5,
            min_variance: 0.0,
            max_autocorrelation: 1.0,
            ..QualityThresholds::default()
        };

        assert!(matches!(
            relaxed.check(&stats),
            Err(ThresholdViolation::NonUniformBytes { .. })
        ));
    }

    #[test]
    fn test_permissive_still_catches_stuck_bits() {
        let stats = StatisticalTests::analyze(&[0x80u8; 1000]);
        assert!(matches!(
            QualityThresholds::permissive().check(&stats),
            Err(ThresholdViolation::BitBias { .. })
        ));
        assert!(QualityThresholds::conservative().check(&stats).is_err());
    }
}
