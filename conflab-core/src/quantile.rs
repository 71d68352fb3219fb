//! Empirical quantiles with linear interpolation between order statistics.
//!
//! Rank convention: `level * (n - 1)`, interpolating between the two adjacent
//! order statistics. The same convention is used for every percentile in the
//! system, including downstream backtest diagnostics.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantileError {
    #[error("insufficient sample: cannot take a quantile of zero scores")]
    InsufficientSample,
    #[error("invalid quantile level {level}: must lie strictly inside (0, 1)")]
    InvalidLevel { level: f64 },
    #[error("non-finite score {value} at position {index}")]
    NonFinite { index: usize, value: f64 },
}

/// A validated, ascending score sample.
///
/// Sorting once lets a caller draw several quantiles (EnbPI needs two) without
/// re-sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSample {
    sorted: Vec<f64>,
}

impl SortedSample {
    pub fn new(scores: &[f64]) -> Result<Self, QuantileError> {
        if scores.is_empty() {
            return Err(QuantileError::InsufficientSample);
        }
        if let Some((index, &value)) = scores.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(QuantileError::NonFinite { index, value });
        }
        let mut sorted = scores.to_vec();
        sorted.sort_by(f64::total_cmp);
        Ok(Self { sorted })
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.sorted
    }

    /// Quantile at `level ∈ (0, 1)`.
    pub fn quantile(&self, level: f64) -> Result<f64, QuantileError> {
        if !(level > 0.0 && level < 1.0) {
            return Err(QuantileError::InvalidLevel { level });
        }
        Ok(interpolate(&self.sorted, level))
    }
}

/// Quantile of an unsorted score sample.
pub fn quantile(scores: &[f64], level: f64) -> Result<f64, QuantileError> {
    SortedSample::new(scores)?.quantile(level)
}

fn interpolate(sorted: &[f64], level: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = level * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    let (a, b) = (sorted[lo], sorted[hi]);
    // Clamped so rounding never leaves [a, b]; keeps the estimate monotone in level.
    (a + (b - a) * frac).clamp(a, b)
}
