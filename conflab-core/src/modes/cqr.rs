//! Conformalized quantile regression.
//!
//! Coverage scores over the window, `(1 - alpha)` quantile, applied
//! symmetrically to both bounds after horizon scaling.

use crate::domain::Mode;
use crate::error::CalibrationError;
use crate::quantile::quantile;
use crate::score::{horizon_scale, NonconformityScorer};

use super::{check_coverage, require_points, CalibrationInput, ModeEngine, ModeFields, ModeOutput};

#[derive(Debug, Clone)]
pub struct Cqr {
    min_points: usize,
}

impl Cqr {
    pub fn new(min_points: usize) -> Self {
        Self { min_points }
    }
}

impl ModeEngine for Cqr {
    fn mode(&self) -> Mode {
        Mode::Cqr
    }

    fn min_points(&self) -> usize {
        self.min_points.max(1)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        Ok(())
    }

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<ModeOutput, CalibrationError> {
        check_coverage(input.coverage)?;
        require_points(input.window.len(), self.min_points())?;

        let scores = NonconformityScorer::coverage(input.domain).score_all(input.window)?;
        let level = 1.0 - input.alpha();
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
            fields: ModeFields::Cqr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use crate::test_helpers::{next_forecast, noisy_window, window_with_scores};

    fn twenty_scores() -> Vec<f64> {
        (0..20).map(|i| 0.01 + 0.04 * i as f64 / 19.0).collect()
    }

    fn run(window: &[crate::domain::BaseForecast], coverage: f64) -> Result<ModeOutput, CalibrationError> {
        let target = next_forecast(window, window.len());
        Cqr::new(10).calibrate(&CalibrationInput {
            window,
            target: &target,
            domain: window[0].domain,
            coverage,
            prior: None,
            feedback: &[],
        })
    }

    #[test]
    fn picks_ninetieth_percentile_symmetrically() {
        let scores = twenty_scores();
        let window = window_with_scores("SPY", &scores, 0.9);
        let out = run(&window, 0.9).unwrap();

        let expected = scores[17] * 0.9 + scores[18] * 0.1;
        assert!((out.q_cal - expected).abs() < 1e-9, "q_cal {} vs {expected}", out.q_cal);
        assert_eq!(out.delta_l, out.delta_u);
        assert_eq!(out.q_cal_scaled(), out.delta_l);
        assert_eq!(out.horizon_scale, 1.0);
        assert_eq!(out.n_scores, 20);
    }

    #[test]
    fn too_few_points_is_insufficient_calibration_data() {
        let window = window_with_scores("SPY", &[0.01, 0.02, 0.03], 0.9);
        assert_eq!(
            run(&window, 0.9).unwrap_err(),
            CalibrationError::InsufficientCalibrationData { have: 3, need: 10 }
        );
    }

    #[test]
    fn higher_coverage_never_narrows() {
        let window = noisy_window("SPY", 60, 11, Domain::Log, 0.9);
        let lo = run(&window, 0.8).unwrap();
        let hi = run(&window, 0.95).unwrap();
        assert!(hi.delta_l + hi.delta_u >= lo.delta_l + lo.delta_u);
    }

    #[test]
    fn mixed_horizons_rescale_quantile() {
        let mut window = window_with_scores("SPY", &twenty_scores(), 0.9);
        for f in window.iter_mut() {
            f.horizon = 4;
        }
        let mut target = next_forecast(&window, 20);
        target.horizon = 1;
        let out = Cqr::new(10)
            .calibrate(&CalibrationInput {
                window: &window,
                target: &target,
                domain: Domain::Price,
                coverage: 0.9,
                prior: None,
                feedback: &[],
            })
            .unwrap();
        assert!((out.horizon_scale - 0.5).abs() < 1e-15);
        assert!((out.delta_l - out.q_cal * 0.5).abs() < 1e-15);
    }

    #[test]
    fn cross_domain_window_is_rejected() {
        let window = window_with_scores("SPY", &twenty_scores(), 0.9);
        let target = next_forecast(&window, 20);
        let err = Cqr::new(10)
            .calibrate(&CalibrationInput {
                window: &window,
                target: &target,
                domain: Domain::Log,
                coverage: 0.9,
                prior: None,
                feedback: &[],
            })
            .unwrap_err();
        assert!(matches!(err, CalibrationError::Score(_)));
    }
}
