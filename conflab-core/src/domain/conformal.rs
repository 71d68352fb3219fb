//! Calibrated output records.
//!
//! A `ConformalForecast` is immutable once emitted. Its provenance carries the
//! full state snapshot so downstream diagnostics can reconstruct which mode and
//! parameters produced any historical interval without consulting live state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::forecast::Domain;
use super::ids::{ForecastId, RecordId};
use super::mode::Mode;
use crate::state::ConformalState;

/// Everything needed to audit a calibrated interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub mode: Mode,
    pub coverage: f64,
    pub alpha: f64,
    /// Quantile level used for the lower adjustment.
    pub level_lo: f64,
    /// Quantile level used for the upper adjustment.
    pub level_hi: f64,
    pub window_len: usize,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    /// Number of scores (or residuals) the quantiles were drawn from.
    pub n_scores: usize,
    /// Previously issued intervals resolved during this calibration.
    pub feedback_applied: usize,
    pub seed: Option<u64>,
    pub state: ConformalState,
}

/// A base forecast after conformal calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformalForecast {
    pub record_id: RecordId,
    pub symbol: String,
    pub date_t: NaiveDate,
    pub horizon: u32,
    /// Method of the base forecast that was calibrated.
    pub method: String,
    pub base_forecast_id: ForecastId,
    pub domain: Domain,
    /// Calibrated bounds in domain coordinates: `L_base - delta_L`, `U_base + delta_U`.
    pub lower_domain: f64,
    pub upper_domain: f64,
    /// Calibrated bounds as price levels.
    pub lower: f64,
    pub upper: f64,
    pub point_estimate: f64,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl ConformalForecast {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Whether a realized price falls inside the calibrated interval.
    pub fn contains(&self, realized: f64) -> bool {
        realized >= self.lower && realized <= self.upper
    }
}
