//! Base forecasts and the log/price domain transform.
//!
//! Base forecasts are stored as raw price levels together with the close at
//! the forecast origin. Calibration happens in one of two coordinate systems:
//! - `Price`: raw levels, unchanged.
//! - `Log`: log-returns from the origin, `ln(x / origin_price)`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::ForecastId;

/// Coordinate system a calibration operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Log,
    Price,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Log => "log",
            Domain::Price => "price",
        }
    }

    /// Map a price level into this domain, anchored at `origin`.
    pub fn to_domain(&self, origin: f64, level: f64) -> Option<f64> {
        match self {
            Domain::Price => level.is_finite().then_some(level),
            Domain::Log => {
                if origin > 0.0 && level > 0.0 && origin.is_finite() && level.is_finite() {
                    Some((level / origin).ln())
                } else {
                    None
                }
            }
        }
    }

    /// Map a domain coordinate back to a price level, anchored at `origin`.
    pub fn to_level(&self, origin: f64, value: f64) -> f64 {
        match self {
            Domain::Price => value,
            Domain::Log => origin * value.exp(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(Domain::Log),
            "price" => Ok(Domain::Price),
            other => Err(format!("unknown domain '{other}' (expected 'log' or 'price')")),
        }
    }
}

/// A raw prediction interval from a base model.
///
/// Immutable once created. `realized_outcome` is filled in by the ingestion
/// pipeline once the verification date has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseForecast {
    pub id: ForecastId,
    pub symbol: String,
    pub date_t: NaiveDate,
    /// Name of the base model (e.g. "garch11", "gbm", "range_yz").
    pub method: String,
    pub domain: Domain,
    /// Forecast horizon in trading days.
    pub horizon: u32,
    /// Nominal coverage of the base interval.
    pub coverage: f64,
    /// Close at the forecast origin; anchor of the log transform.
    pub origin_price: f64,
    pub point_estimate: f64,
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub realized_outcome: Option<f64>,
    /// Locked by the producing pipeline; drafts are never calibrated.
    #[serde(default = "default_final")]
    pub is_final: bool,
}

fn default_final() -> bool {
    true
}

/// Errors converting a base forecast into domain coordinates.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("forecast {id}: {field} = {value} cannot be expressed in the {domain} domain")]
    NotRepresentable {
        id: ForecastId,
        field: &'static str,
        value: f64,
        domain: Domain,
    },
    #[error("forecast {id}: lower bound {lower} exceeds upper bound {upper}")]
    InvertedInterval { id: ForecastId, lower: f64, upper: f64 },
}

/// A base forecast expressed in domain coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainView {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    pub outcome: Option<f64>,
}

impl BaseForecast {
    pub fn is_realized(&self) -> bool {
        self.realized_outcome.is_some()
    }

    /// Express point, bounds and outcome in this forecast's own domain.
    pub fn view(&self) -> Result<DomainView, ForecastError> {
        if self.lower > self.upper {
            return Err(ForecastError::InvertedInterval {
                id: self.id.clone(),
                lower: self.lower,
                upper: self.upper,
            });
        }
        let convert = |field: &'static str, value: f64| {
            self.domain
                .to_domain(self.origin_price, value)
                .ok_or_else(|| ForecastError::NotRepresentable {
                    id: self.id.clone(),
                    field,
                    value,
                    domain: self.domain,
                })
        };
        Ok(DomainView {
            point: convert("point_estimate", self.point_estimate)?,
            lower: convert("lower", self.lower)?,
            upper: convert("upper", self.upper)?,
            outcome: self
                .realized_outcome
                .map(|y| convert("realized_outcome", y))
                .transpose()?,
        })
    }
}
