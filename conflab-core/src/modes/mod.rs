//! Calibration modes: one `ModeEngine` capability, three implementations.
//!
//! The mode is selected once per calibration from [`ModeConfig`]; shared
//! helpers (scoring, quantiles, horizon scaling) never branch on it.

pub mod aci;
pub mod cqr;
pub mod enbpi;

use serde::{Deserialize, Serialize};

use crate::domain::{BaseForecast, Domain, Mode};
use crate::error::CalibrationError;
use crate::state::{ConformalParams, ResolvedOutcome};

pub use aci::Aci;
pub use cqr::Cqr;
pub use enbpi::Enbpi;

/// Everything an engine may look at. Engines perform no I/O.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationInput<'a> {
    /// Verified base forecasts, ascending by date.
    pub window: &'a [BaseForecast],
    /// Today's base forecast, the one being calibrated.
    pub target: &'a BaseForecast,
    pub domain: Domain,
    /// Target coverage `1 - alpha`.
    pub coverage: f64,
    /// Params of the prior state when it has the same mode and domain.
    pub prior: Option<&'a ConformalParams>,
    /// Previously issued intervals resolved since the last calibration.
    pub feedback: &'a [ResolvedOutcome],
}

impl CalibrationInput<'_> {
    pub fn alpha(&self) -> f64 {
        1.0 - self.coverage
    }
}

/// Mode-specific output fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModeFields {
    Cqr,
    Enbpi { k: u32, seed: u64 },
    Aci { eta: f64, theta: f64 },
}

impl ModeFields {
    pub fn mode(&self) -> Mode {
        match self {
            ModeFields::Cqr => Mode::Cqr,
            ModeFields::Enbpi { .. } => Mode::Enbpi,
            ModeFields::Aci { .. } => Mode::Aci,
        }
    }
}

/// Calibration deltas and the quantities they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeOutput {
    /// Subtracted from the base lower bound (domain coordinates).
    pub delta_l: f64,
    /// Added to the base upper bound (domain coordinates).
    pub delta_u: f64,
    pub q_cal: f64,
    pub horizon_scale: f64,
    pub level_lo: f64,
    pub level_hi: f64,
    pub n_scores: usize,
    pub fields: ModeFields,
}

impl ModeOutput {
    pub fn q_cal_scaled(&self) -> f64 {
        self.q_cal * self.horizon_scale
    }
}

/// A calibration strategy.
pub trait ModeEngine: Send + Sync {
    fn mode(&self) -> Mode;

    /// Minimum number of window points this engine accepts.
    fn min_points(&self) -> usize;

    /// Configuration checks that need no data.
    fn validate(&self) -> Result<(), CalibrationError>;

    fn calibrate(&self, input: &CalibrationInput<'_>) -> Result<ModeOutput, CalibrationError>;
}

/// Serializable mode selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModeConfig {
    #[default]
    Cqr,
    Enbpi {
        #[serde(default = "default_ensemble_size")]
        ensemble_size: u32,
        /// Pinned bootstrap seed; derived per calibration when absent.
        #[serde(default)]
        seed: Option<u64>,
    },
    Aci {
        eta: f64,
        #[serde(default)]
        initial_theta: f64,
        #[serde(default = "default_epsilon")]
        epsilon: f64,
    },
}

fn default_ensemble_size() -> u32 {
    20
}

fn default_epsilon() -> f64 {
    aci::DEFAULT_EPSILON
}

impl ModeConfig {
    pub fn mode(&self) -> Mode {
        match self {
            ModeConfig::Cqr => Mode::Cqr,
            ModeConfig::Enbpi { .. } => Mode::Enbpi,
            ModeConfig::Aci { .. } => Mode::Aci,
        }
    }

    /// Build and validate the engine for this configuration.
    pub fn build(&self, min_points: usize) -> Result<Box<dyn ModeEngine>, CalibrationError> {
        let engine: Box<dyn ModeEngine> = match *self {
            ModeConfig::Cqr => Box::new(Cqr::new(min_points)),
            ModeConfig::Enbpi { ensemble_size, seed } => {
                Box::new(Enbpi::new(ensemble_size, seed, min_points))
            }
            ModeConfig::Aci { eta, initial_theta, epsilon } => {
                Box::new(Aci::new(eta, min_points).with_initial_theta(initial_theta).with_epsilon(epsilon))
            }
        };
        engine.validate()?;
        Ok(engine)
    }
}

pub(crate) fn require_points(have: usize, need: usize) -> Result<(), CalibrationError> {
    if have < need {
        return Err(CalibrationError::InsufficientCalibrationData { have, need });
    }
    Ok(())
}

pub(crate) fn check_coverage(coverage: f64) -> Result<(), CalibrationError> {
    if !(coverage > 0.0 && coverage < 1.0) {
        return Err(CalibrationError::InvalidConfig {
            message: format!("coverage {coverage} outside (0, 1)"),
        });
    }
    Ok(())
}
