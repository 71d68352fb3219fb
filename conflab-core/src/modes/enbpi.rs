//! Ensemble bootstrap prediction intervals.
//!
//! 1. Residuals `r_i = y_i - point_i` over the window (domain coordinates).
//! 2. `K` bootstrap members, each a with-replacement resample of the window,
//!    learn an in-bag bias (mean residual).
//! 3. For each window date, the out-of-bag aggregate prediction is
//!    `point_i + mean(bias of members that did not draw i)`; its residual
//!    against the realized outcome enters the calibration distribution.
//!    Dates drawn by every member have no out-of-bag prediction and are skipped.
//! 4. The `alpha/2` and `1 - alpha/2` quantiles of those residuals give the
//!    band around today's ensemble-corrected point. Deltas are expressed
//!    against today's base bounds, so they generally differ.

use rand::Rng;

use crate::domain::Mode;
use crate::error::CalibrationError;
use crate::quantile::SortedSample;
use crate::rng::{rng_for, SeedPolicy};
use crate::score::{horizon_scale, NonconformityScorer};

use super::{check_coverage, require_points, CalibrationInput, ModeEngine, ModeFields, ModeOutput};

/// Smallest ensemble that still leaves most dates with out-of-bag members.
pub const MIN_ENSEMBLE_SIZE: u32 = 5;

/// Out-of-bag residuals needed for a two-sided quantile.
const MIN_OOB_RESIDUALS: usize = 2;

#[derive(Debug, Clone)]
pub struct Enbpi {
    k: u32,
    seed_policy: SeedPolicy,
    min_points: usize,
}

impl Enbpi {
    pub fn new(k: u32, seed: Option<u64>, min_points: usize) -> Self {
        Self {
            k,
            seed_policy: SeedPolicy::from_config(seed),
            min_points,
        }
    }

    pub fn ensemble_size(&self) -> u32 {
        self.k
    }
}

/// One bootstrap member: which window positions it drew, and its bias.
struct Member {
    in_bag: Vec<bool>,
    bias: f64,
}

fn fit_members(residuals: &[f64], k: u32, seed: u64) -> Vec<Member> {
    let n = residuals.len();
    let mut rng = rng_for(seed);
    (0..k)
        .map(|_| {
            let mut in_bag = vec![false; n];
            let mut sum = 0.0;
            for _ in 0..n {
                let idx = rng.gen_range(0..n);
                in_bag[idx] = true;
                sum += residuals[idx];
            }
            Member { in_bag, bias: sum / n as f64 }
        })
        .collect()
}

fn out_of_bag_residuals(residuals: &[f64], members: &[Member]) -> Vec<f64> {
    residuals
        .iter()
        .enumerate()
        .filter_map(|(i, &r)| {
            let (sum, count) = members
                .iter()
                .filter(|m| !m.in_bag[i])
                .fold((0.0, 0usize), |(s, c), m| (s + m.bias, c + 1));
            (count > 0).then(|| r - sum / count as f64)
        })
        .collect()
}

impl ModeEngine for Enbpi {
    fn mode(&self) -> Mode {
        Mode::Enbpi
    }

    fn min_points(&self) -> usize {
        self.min_points.max(MIN_OOB_RESIDUALS)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if self.k < MIN_ENSEMBLE_SIZE {
            return Err(CalibrationError::EnbPIRequiresMinimumEnsembleSize {
                k: self.k,
                min: MIN_ENSEMBLE_SIZE,
            });
        }
        Ok(())
    }

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<ModeOutput, CalibrationError> {
        self.validate()?;
        check_coverage(input.coverage)?;
        require_points(input.window.len(), self.min_points())?;

        let scorer = NonconformityScorer::residual(input.domain);
        let residuals = scorer.score_all(input.window)?;
        let today = scorer.view(input.target)?;

        let target = input.target;
        let seed = self.seed_policy.resolve(&target.symbol, target.date_t, &target.method, self.k);
        let members = fit_members(&residuals, self.k, seed);
        let oob = out_of_bag_residuals(&residuals, &members);
        require_points(oob.len(), MIN_OOB_RESIDUALS)?;

        let alpha = input.alpha();
        let level_lo = alpha / 2.0;
        let level_hi = 1.0 - alpha / 2.0;
        let sample = SortedSample::new(&oob)?;
        let q_lo = sample.quantile(level_lo)?;
        let q_hi = sample.quantile(level_hi)?;

        let scale = horizon_scale(input.window, target.horizon);
        let ensemble_bias = members.iter().map(|m| m.bias).sum::<f64>() / members.len() as f64;
        let center = today.point + ensemble_bias;

        Ok(ModeOutput {
            delta_l: today.lower - (center + q_lo * scale),
            delta_u: (center + q_hi * scale) - today.upper,
            q_cal: (q_hi - q_lo) / 2.0,
            horizon_scale: scale,
            level_lo,
            level_hi,
            n_scores: oob.len(),
            fields: ModeFields::Enbpi { k: self.k, seed },
        })
    }
}
