//! Adaptive conformal inference.
//!
//! `theta` is a running offset on the miscoverage rate. Each previously issued
//! interval whose outcome became known since the last calibration updates it:
//!
//!   theta <- theta + eta * (alpha - miss)
//!
//! so a miss lowers `theta` by `eta * (1 - alpha)` and a hit raises it by
//! `eta * alpha`. The effective quantile level is
//! `clamp(1 - alpha - theta, eps, 1 - eps)`: after a miss the level rises and
//! the next interval widens. The quantile is drawn from the window's coverage
//! scores and applied symmetrically.
//!
//! The level subtracts `theta`. Adding it instead (`1 - alpha + theta`) would
//! narrow the interval after a miss and drive coverage away from target, so
//! the sign follows the adaptive conformal update of Gibbs and Candes. The
//! level actually used is recorded in provenance as `level_lo`/`level_hi`.
//!
//! Unlike CQR and EnbPI the result depends on `theta` carried in state, not
//! only on the window.

use crate::domain::Mode;
use crate::error::CalibrationError;
use crate::quantile::quantile;
use crate::score::{horizon_scale, NonconformityScorer};

use super::{check_coverage, require_points, CalibrationInput, ModeEngine, ModeFields, ModeOutput};

/// Distance the effective level keeps from 0 and 1.
pub const DEFAULT_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct Aci {
    eta: f64,
    initial_theta: f64,
    epsilon: f64,
    min_points: usize,
}

/// One feedback step.
pub fn update_theta(theta: f64, eta: f64, alpha: f64, miss_indicator: f64) -> f64 {
    theta + eta * (alpha - miss_indicator)
}

/// Quantile level implied by `theta`.
pub fn effective_level(alpha: f64, theta: f64, epsilon: f64) -> f64 {
    (1.0 - alpha - theta).clamp(epsilon, 1.0 - epsilon)
}

impl Aci {
    pub fn new(eta: f64, min_points: usize) -> Self {
        Self {
            eta,
            initial_theta: 0.0,
            epsilon: DEFAULT_EPSILON,
            min_points,
        }
    }

    pub fn with_initial_theta(mut self, theta: f64) -> Self {
        self.initial_theta = theta;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// `theta` after applying this call's feedback to the prior level.
    pub fn next_theta(&self, input: &CalibrationInput<'_>) -> f64 {
        let alpha = input.alpha();
        let start = input.prior.and_then(|p| p.theta).unwrap_or(self.initial_theta);
        input
            .feedback
            .iter()
            .fold(start, |theta, r| update_theta(theta, self.eta, alpha, r.miss_indicator()))
    }
}

impl ModeEngine for Aci {
    fn mode(&self) -> Mode {
        Mode::Aci
    }

    fn min_points(&self) -> usize {
        self.min_points.max(1)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if !(self.eta > 0.0 && self.eta.is_finite()) {
            return Err(CalibrationError::ACIRequiresPositiveStepSize { eta: self.eta });
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.5) {
            return Err(CalibrationError::InvalidConfig {
                message: format!("ACI epsilon {} outside (0, 0.5)", self.epsilon),
            });
        }
        if !self.initial_theta.is_finite() {
            return Err(CalibrationError::InvalidConfig {
                message: "ACI initial_theta must be finite".to_string(),
            });
        }
        Ok(())
    }

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<ModeOutput, CalibrationError> {
        self.validate()?;
        check_coverage(input.coverage)?;
        require_points(input.window.len(), self.min_points())?;

        let theta = self.next_theta(input);
        let level = effective_level(input.alpha(), theta, self.epsilon);

        let scores = NonconformityScorer::coverage(input.domain).score_all(input.window)?;
        let q_cal = quantile(&scores, level)?;
        let scale = horizon_scale(input.window, input.target.horizon);
        let delta = q_cal * scale;

        Ok(ModeOutput {
            delta_l: delta,
            delta_u: delta,
            q_cal,
            horizon_scale: scale,
            level_lo: level,
            level_hi: level,
            n_scores: scores.len(),
            fields: ModeFields::Aci { eta: self.eta, theta },
        })
    }
}
