//! Typed calibration outcomes.
//!
//! Every failure the engine can produce is a variant here. None of them are
//! fatal to the calling process, and each carries a caller-facing hint.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{Domain, Mode};
use crate::quantile::QuantileError;
use crate::score::ScoreError;

/// Failures of the collaborator stores (forecast store, state store).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("i/o error at {path}: {message}")]
    Io { path: String, message: String },
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("no target specification for {symbol}")]
    TargetSpecNotFound { symbol: String },

    #[error("domain conflict for {symbol}: persisted state is {persisted}, request is {requested}")]
    DomainConflict {
        symbol: String,
        persisted: Domain,
        requested: Domain,
    },

    #[error("no base forecast found for {symbol}: {detail}")]
    NoBaseForecastFound { symbol: String, detail: String },

    #[error("insufficient base forecasts for {symbol} ({mode}): {have} eligible < minimum {need}")]
    InsufficientBaseForecasts {
        symbol: String,
        mode: Mode,
        have: usize,
        need: usize,
    },

    #[error("insufficient calibration data: {have} points < minimum {need}")]
    InsufficientCalibrationData { have: usize, need: usize },

    #[error("EnbPI requires at least {min} ensemble members, got {k}")]
    EnbPIRequiresMinimumEnsembleSize { k: u32, min: u32 },

    #[error("ACI requires a positive step size, got eta = {eta}")]
    ACIRequiresPositiveStepSize { eta: f64 },

    #[error("invalid calibration config: {message}")]
    InvalidConfig { message: String },

    #[error("{symbol} {date_t} ({method}) is already calibrated; pass recompute to replace it")]
    AlreadyCalibrated {
        symbol: String,
        date_t: NaiveDate,
        method: String,
    },

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QuantileError> for CalibrationError {
    fn from(err: QuantileError) -> Self {
        match err {
            QuantileError::InsufficientSample => {
                CalibrationError::InsufficientCalibrationData { have: 0, need: 1 }
            }
            QuantileError::InvalidLevel { level } => CalibrationError::InvalidConfig {
                message: format!("quantile level {level} outside (0, 1)"),
            },
            QuantileError::NonFinite { index, value } => CalibrationError::InvalidConfig {
                message: format!("non-finite score {value} at window position {index}"),
            },
        }
    }
}

impl CalibrationError {
    /// Actionable message for the operator or dashboard.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::TargetSpecNotFound { .. } => "Define a target horizon and coverage for this symbol",
            Self::DomainConflict { .. } => {
                "Re-run with the persisted domain, or force the new domain to reset calibration state"
            }
            Self::NoBaseForecastFound { .. } => "Generate base forecasts first",
            Self::InsufficientBaseForecasts { .. } | Self::InsufficientCalibrationData { .. } => {
                "Widen the calibration window or wait for more verified history"
            }
            Self::EnbPIRequiresMinimumEnsembleSize { .. } => "Set ensemble_size to 5 or more",
            Self::ACIRequiresPositiveStepSize { .. } => "Set eta to a positive step size",
            Self::InvalidConfig { .. } => "Fix the calibration configuration",
            Self::AlreadyCalibrated { .. } => "Pass the recompute flag to replace the existing calibration",
            Self::Score(ScoreError::DomainMismatch { .. }) => {
                "Calibrate base forecasts produced in the same domain as the calibration state"
            }
            Self::Score(_) => "Check the base forecast records for invalid values",
            Self::Store(_) => "Check the storage backend and retry the whole calibration",
        }
    }

    /// HTTP-style status for API layers that surface these outcomes.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TargetSpecNotFound { .. } | Self::NoBaseForecastFound { .. } => 404,
            Self::DomainConflict { .. } | Self::AlreadyCalibrated { .. } => 409,
            Self::InsufficientBaseForecasts { .. }
            | Self::InsufficientCalibrationData { .. }
            | Self::EnbPIRequiresMinimumEnsembleSize { .. }
            | Self::ACIRequiresPositiveStepSize { .. }
            | Self::InvalidConfig { .. }
            | Self::Score(_) => 422,
            Self::Store(_) => 500,
        }
    }

    /// Configuration errors are detected before any I/O happens.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::EnbPIRequiresMinimumEnsembleSize { .. }
                | Self::ACIRequiresPositiveStepSize { .. }
                | Self::InvalidConfig { .. }
        )
    }
}
