//! Statistical sanity checks over raw or shaped entropy.
//!
//! Everything is computed in one pass over the sample. Passing says the
//! output is not obviously broken; it says nothing about unpredictability.

/// Summary statistics of a byte sample.
#[derive(Debug, Clone)]
pub struct StatisticalTests {
    /// Fraction of one bits minus 0.5.
    pub bit_bias: f64,
    /// Population variance of byte values (uniform bytes give ~5461).
    pub variance: f64,
    /// Lag-1 autocorrelation of byte values.
    pub autocorrelation: f64,
    /// Chi-square of the byte histogram against uniform (255 degrees of freedom).
    pub byte_chi_square: f64,
    /// Bytes analyzed.
    pub sample_size: usize,
}

impl StatisticalTests {
    /// Analyzes a byte sample.
    pub fn analyze(data: &[u8]) -> Self {
        let mut histogram = [0u64; 256];
        let mut ones = 0u64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut lag_products = 0.0f64;

        for (i, &b) in data.iter().enumerate() {
            histogram[usize::from(b)] += 1;
            ones += u64::from(b.count_ones());
            let x = f64::from(b);
            sum += x;
            sum_sq += x * x;
            if let Some(&next) = data.get(i + 1) {
                lag_products += x * f64::from(next);
            }
        }

        let n = data.len();
        let (variance, autocorrelation) = if n == 0 {
            (0.0, 0.0)
        } else {
            let len = n as f64;
            let mean = sum / len;
            let centered_sq = sum_sq - len * mean * mean;
            let variance = (centered_sq / len).max(0.0);
            let autocorrelation = if n < 2 {
                0.0
            } else if centered_sq <= f64::EPSILON {
                // A constant stream is perfectly predictable.
                1.0
            } else {
                // sum over adjacent pairs of (x_i - mean)(x_{i+1} - mean)
                let first = f64::from(data[0]);
                let last = f64::from(data[n - 1]);
                let covariance = lag_products - mean * (2.0 * sum - first - last)
                    + (len - 1.0) * mean * mean;
                covariance / centered_sq
            };
            (variance, autocorrelation)
        };

        Self {
            bit_bias: if n == 0 { 0.0 } else { ones as f64 / (n * 8) as f64 - 0.5 },
            variance,
            autocorrelation,
            byte_chi_square: chi_square(&histogram),
            sample_size: n,
        }
    }

    /// Loose verdict used for quick checks; see
    /// [`QualityThresholds`](super::QualityThresholds) for tunable limits.
    pub fn looks_reasonable(&self) -> bool {
        self.bit_bias.abs() < 0.1 && self.variance > 100.0 && self.autocorrelation.abs() < 0.5
    }
}

/// Bit bias as deviation from 0.5, in [-0.5, 0.5].
pub fn bit_bias(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let ones: u64 = data.iter().map(|b| u64::from(b.count_ones())).sum();
    ones as f64 / (data.len() * 8) as f64 - 0.5
}

/// Pearson chi-square statistic of `observed` bucket counts against a
/// uniform expectation. Degrees of freedom are `observed.len() - 1`.
pub fn chi_square(observed: &[u64]) -> f64 {
    let total: u64 = observed.iter().sum();
    if observed.is_empty() || total == 0 {
        return 0.0;
    }
    let expected = total as f64 / observed.len() as f64;
    observed
        .iter()
        .map(|&o| {
            let d = o as f64 - expected;
            d * d / expected
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spread_sample_has_variance() {
        let data: Vec<u8> = (0..1000).map(|i| (i * 17 + 31) as u8).collect();
        assert!(StatisticalTests::analyze(&data).variance > 100.0);
    }

    #[test]
    fn test_constant_data_fails() {
        let stats = StatisticalTests::analyze(&[0x80u8; 1000]);

        assert!(stats.variance.abs() < 1e-9);
        assert_eq!(stats.autocorrelation, 1.0);
        assert!(!stats.looks_reasonable());
    }

    #[test]
    fn test_all_ones_biased() {
        let stats = StatisticalTests::analyze(&[0xFFu8; 1000]);

        assert!((stats.bit_bias - 0.5).abs() < 0.001);
        assert!(!stats.looks_reasonable());
    }

    #[test]
    fn test_empty_sample() {
        let stats = StatisticalTests::analyze(&[]);
        assert_eq!(stats.sample_size, 0);
        assert_eq!(stats.bit_bias, 0.0);
        assert_eq!(stats.byte_chi_square, 0.0);
    }

    #[test]
    fn test_autocorrelation_matches_direct_formula() {
        let data: Vec<u8> = (0..500u32).map(|i| (i * i % 251) as u8).collect();
        let n = data.len() as f64;
        let mean = data.iter().map(|&b| f64::from(b)).sum::<f64>() / n;
        let var: f64 = data.iter().map(|&b| (f64::from(b) - mean).powi(2)).sum();
        let cov: f64 = data
            .windows(2)
            .map(|w| (f64::from(w[0]) - mean) * (f64::from(w[1]) - mean))
            .sum();

        let stats = StatisticalTests::analyze(&data);
        assert!((stats.autocorrelation - cov / var).abs() < 1e-9);
        assert!((stats.variance - var / n).abs() < 1e-6);
    }

    #[test]
    fn test_alternating_bits_unbiased() {
        assert!(bit_bias(&[0xAA; 100]).abs() < 0.001);
        assert!((bit_bias(&[0x00; 100]) + 0.5).abs() < 0.001);
    }

    #[test]
    fn test_chi_square_perfectly_uniform_is_zero() {
        assert_eq!(chi_square(&[25, 25, 25, 25]), 0.0);
    }

    #[test]
    fn test_chi_square_skewed() {
        // expected 25 per bucket: (75^2 + 3 * 25^2) / 25
        assert!((chi_square(&[100, 0, 0, 0]) - 300.0).abs() < 1e-9);
    }
}
