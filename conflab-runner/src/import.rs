//! CSV import of base forecasts.
//!
//! Columns (header row required, order free):
//! `id, symbol, date_t, method, domain, horizon, coverage, origin_price,
//! point_estimate, lower, upper, realized_outcome, is_final`.
//!
//! `id`, `realized_outcome` and `is_final` may be empty or absent. A missing id
//! is derived from `(symbol, date_t, method, horizon)`; `is_final` defaults to
//! true. Every row is checked to be representable in its domain.

use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use conflab_core::domain::{BaseForecast, Domain, ForecastId};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    symbol: String,
    date_t: NaiveDate,
    method: String,
    domain: Domain,
    horizon: u32,
    coverage: f64,
    origin_price: f64,
    point_estimate: f64,
    lower: f64,
    upper: f64,
    #[serde(default)]
    realized_outcome: Option<f64>,
    #[serde(default)]
    is_final: Option<bool>,
}

impl CsvRow {
    fn into_forecast(self, row: usize) -> Result<BaseForecast, ImportError> {
        let invalid = |message: String| ImportError::InvalidRow { row, message };

        if self.symbol.trim().is_empty() || self.method.trim().is_empty() {
            return Err(invalid("symbol and method must not be empty".to_string()));
        }
        if self.horizon == 0 {
            return Err(invalid("horizon must be at least 1".to_string()));
        }
        if !(self.coverage > 0.0 && self.coverage < 1.0) {
            return Err(invalid(format!("coverage {} outside (0, 1)", self.coverage)));
        }

        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .map(ForecastId::new)
            .unwrap_or_else(|| ForecastId::derive(&self.symbol, self.date_t, &self.method, self.horizon));

        let forecast = BaseForecast {
            id,
            symbol: self.symbol,
            date_t: self.date_t,
            method: self.method,
            domain: self.domain,
            horizon: self.horizon,
            coverage: self.coverage,
            origin_price: self.origin_price,
            point_estimate: self.point_estimate,
            lower: self.lower,
            upper: self.upper,
            realized_outcome: self.realized_outcome,
            is_final: self.is_final.unwrap_or(true),
        };
        forecast.view().map_err(|e| invalid(e.to_string()))?;
        Ok(forecast)
    }
}

/// Parse base forecasts from any CSV reader.
pub fn read_base_forecasts_csv<R: Read>(reader: R) -> Result<Vec<BaseForecast>, ImportError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut forecasts = Vec::new();
    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        // Row 1 is the header.
        let row_no = i + 2;
        let row = row.map_err(|e| ImportError::InvalidRow {
            row: row_no,
            message: e.to_string(),
        })?;
        forecasts.push(row.into_forecast(row_no)?);
    }
    Ok(forecasts)
}

/// Parse base forecasts from a CSV file.
pub fn import_base_forecasts_csv(path: &Path) -> Result<Vec<BaseForecast>, ImportError> {
    let file = std::fs::File::open(path).map_err(|e| ImportError::Open {
        path: path.to_path_buf(),
        source: csv::Error::from(e),
    })?;
    let forecasts = read_base_forecasts_csv(file)?;
    tracing::info!(path = %path.display(), rows = forecasts.len(), "imported base forecasts");
    Ok(forecasts)
}
