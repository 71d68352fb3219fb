//! Nonconformity scoring and horizon scaling.
//!
//! Two score families:
//! - Coverage score `max(L - y, y - U, 0)`: distance by which the outcome
//!   escaped the base interval. Used by CQR and ACI.
//! - Residual score `y - point`: signed error of the point estimate. Used by
//!   EnbPI.
//!
//! Scores are always computed in the scorer's domain. A base forecast produced
//! in a different domain is rejected rather than converted.

use thiserror::Error;

use crate::domain::{BaseForecast, Domain, DomainView, ForecastError, ForecastId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreKind {
    Coverage,
    Residual,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("forecast {id} is in the {found} domain but calibration runs in the {expected} domain")]
    DomainMismatch {
        id: ForecastId,
        expected: Domain,
        found: Domain,
    },
    #[error("forecast {id} has no realized outcome yet")]
    Unrealized { id: ForecastId },
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

/// `max(L - y, y - U, 0)`.
pub fn coverage_score(lower: f64, upper: f64, y: f64) -> f64 {
    (lower - y).max(y - upper).max(0.0)
}

/// `y - point`.
pub fn residual_score(point: f64, y: f64) -> f64 {
    y - point
}

#[derive(Debug, Clone, Copy)]
pub struct NonconformityScorer {
    domain: Domain,
    kind: ScoreKind,
}

impl NonconformityScorer {
    pub fn coverage(domain: Domain) -> Self {
        Self { domain, kind: ScoreKind::Coverage }
    }

    pub fn residual(domain: Domain) -> Self {
        Self { domain, kind: ScoreKind::Residual }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn kind(&self) -> ScoreKind {
        self.kind
    }

    /// Domain view of a forecast, checking it belongs to this scorer's domain.
    pub fn view(&self, base: &BaseForecast) -> Result<DomainView, ScoreError> {
        if base.domain != self.domain {
            return Err(ScoreError::DomainMismatch {
                id: base.id.clone(),
                expected: self.domain,
                found: base.domain,
            });
        }
        Ok(base.view()?)
    }

    /// Score a single realized forecast.
    pub fn score(&self, base: &BaseForecast) -> Result<f64, ScoreError> {
        let view = self.view(base)?;
        let y = view
            .outcome
            .ok_or_else(|| ScoreError::Unrealized { id: base.id.clone() })?;
        Ok(match self.kind {
            ScoreKind::Coverage => coverage_score(view.lower, view.upper, y),
            ScoreKind::Residual => residual_score(view.point, y),
        })
    }

    /// Score every forecast in a window, failing on the first bad element.
    pub fn score_all(&self, window: &[BaseForecast]) -> Result<Vec<f64>, ScoreError> {
        window.iter().map(|f| self.score(f)).collect()
    }
}

/// Square-root-of-time factor mapping window quantiles onto the target horizon.
///
/// `sqrt(h_target / h_window)` where `h_window` is the mean horizon of the
/// window. Exactly 1.0 when every window horizon equals the target.
///
/// The orchestrator's windows only hold forecasts at the target horizon, so
/// on that path the factor is always 1.0. Other factors only arise for
/// callers that hand a mode engine a mixed-horizon window directly.
pub fn horizon_scale(window: &[BaseForecast], target_horizon: u32) -> f64 {
    if window.is_empty() || window.iter().all(|f| f.horizon == target_horizon) {
        return 1.0;
    }
    let mean_h = window.iter().map(|f| f.horizon as f64).sum::<f64>() / window.len() as f64;
    if mean_h <= 0.0 || target_horizon == 0 {
        return 1.0;
    }
    (target_horizon as f64 / mean_h).sqrt()
}
