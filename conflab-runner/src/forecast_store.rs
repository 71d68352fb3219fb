//! JSONL forecast store: append-only base and conformal forecast logs.
//!
//! Two files under the data directory:
//! - `base_forecasts.jsonl`: base forecasts. Re-appending a forecast with an
//!   existing id (for example once its outcome is realized) supersedes the
//!   earlier line.
//! - `conformal_forecasts.jsonl`: calibrated forecasts. Lookups return the
//!   latest line for `(symbol, date_t, method)`.
//!
//! Each line is an independent JSON object, so a torn final write only loses
//! that line. Malformed lines are skipped with a warning.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use conflab_core::domain::{BaseForecast, ConformalForecast, Domain, ForecastId, RecordId};
use conflab_core::store::{pick_latest_final, same_coverage, ForecastStore};
use conflab_core::StoreError;

use crate::state_store::io_error;

pub const BASE_FILE: &str = "base_forecasts.jsonl";
pub const CONFORMAL_FILE: &str = "conformal_forecasts.jsonl";

pub struct JsonlForecastStore {
    base_path: PathBuf,
    conformal_path: PathBuf,
    append_lock: Mutex<()>,
}

impl JsonlForecastStore {
    /// Store rooted at `data_dir`, created if needed.
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        Ok(Self::with_paths(dir.join(BASE_FILE), dir.join(CONFORMAL_FILE)))
    }

    pub fn with_paths(base_path: PathBuf, conformal_path: PathBuf) -> Self {
        Self {
            base_path,
            conformal_path,
            append_lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn conformal_path(&self) -> &Path {
        &self.conformal_path
    }

    /// Append base forecasts. Returns the number written.
    pub fn append_base(&self, forecasts: &[BaseForecast]) -> Result<usize, StoreError> {
        append_jsonl(&self.base_path, forecasts, &self.append_lock)?;
        Ok(forecasts.len())
    }

    /// Current base forecasts: the latest line per id, in first-seen order.
    pub fn base_forecasts(&self) -> Result<Vec<BaseForecast>, StoreError> {
        let all: Vec<BaseForecast> = read_jsonl(&self.base_path)?;
        let mut slot: HashMap<ForecastId, usize> = HashMap::new();
        let mut latest: Vec<BaseForecast> = Vec::with_capacity(all.len());
        for f in all {
            match slot.get(&f.id) {
                Some(&i) => latest[i] = f,
                None => {
                    slot.insert(f.id.clone(), latest.len());
                    latest.push(f);
                }
            }
        }
        Ok(latest)
    }

    /// Record a realized outcome by appending an updated copy of every base
    /// forecast for `(symbol, date_t)`. Returns how many were updated.
    pub fn record_outcome(&self, symbol: &str, date_t: NaiveDate, outcome: f64) -> Result<usize, StoreError> {
        let updated: Vec<BaseForecast> = self
            .base_forecasts()?
            .into_iter()
            .filter(|f| f.symbol == symbol && f.date_t == date_t)
            .map(|mut f| {
                f.realized_outcome = Some(outcome);
                f
            })
            .collect();
        self.append_base(&updated)
    }

    pub fn conformal_forecasts(&self) -> Result<Vec<ConformalForecast>, StoreError> {
        read_jsonl(&self.conformal_path)
    }
}

impl ForecastStore for JsonlForecastStore {
    fn list_eligible_base_forecasts(
        &self,
        symbol: &str,
        domain: Domain,
        horizon: u32,
        coverage: f64,
        method: Option<&str>,
    ) -> Result<Vec<BaseForecast>, StoreError> {
        Ok(self
            .base_forecasts()?
            .into_iter()
            .filter(|f| f.symbol == symbol && f.domain == domain && f.horizon == horizon)
            .filter(|f| same_coverage(f.coverage, coverage))
            .filter(|f| method.map_or(true, |m| f.method == m))
            .collect())
    }

    fn latest_final_forecast(
        &self,
        symbol: &str,
        domain: Domain,
        method: Option<&str>,
    ) -> Result<Option<BaseForecast>, StoreError> {
        let all = self.base_forecasts()?;
        let candidates = all
            .iter()
            .filter(|f| f.symbol == symbol && f.domain == domain)
            .filter(|f| method.map_or(true, |m| f.method == m));
        Ok(pick_latest_final(candidates).cloned())
    }

    fn save_forecast(&self, forecast: &ConformalForecast) -> Result<RecordId, StoreError> {
        append_jsonl(&self.conformal_path, std::slice::from_ref(forecast), &self.append_lock)?;
        Ok(forecast.record_id.clone())
    }

    fn find_conformal(
        &self,
        symbol: &str,
        date_t: NaiveDate,
        method: &str,
    ) -> Result<Option<ConformalForecast>, StoreError> {
        Ok(self
            .conformal_forecasts()?
            .into_iter()
            .rev()
            .find(|c| c.symbol == symbol && c.date_t == date_t && c.method == method))
    }
}

fn append_jsonl<T: Serialize>(path: &Path, records: &[T], lock: &Mutex<()>) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    let mut buf = String::new();
    for r in records {
        let line = serde_json::to_string(r).map_err(|e| StoreError::Serialization(e.to_string()))?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let _guard = lock.lock();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    file.write_all(buf.as_bytes()).map_err(|e| io_error(path, e))?;
    file.flush().map_err(|e| io_error(path, e))?;
    Ok(())
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let mut records = Vec::new();
    for (i, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_error(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(r) => records.push(r),
            Err(e) => tracing::warn!(path = %path.display(), line = i + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflab_core::test_helpers::{price_forecast, trading_day};

    #[test]
    fn later_lines_supersede_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlForecastStore::new(dir.path()).unwrap();
        let f = price_forecast("SPY", trading_day(0), 100.0, 99.0, 101.0, None, 0.9);
        store.append_base(&[f.clone()]).unwrap();
        assert_eq!(store.record_outcome("SPY", trading_day(0), 100.4).unwrap(), 1);

        let all = store.base_forecasts().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].realized_outcome, Some(100.4));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlForecastStore::new(dir.path()).unwrap();
        let f = price_forecast("SPY", trading_day(0), 100.0, 99.0, 101.0, Some(100.2), 0.9);
        store.append_base(&[f]).unwrap();
        let mut file = OpenOptions::new().append(true).open(store.base_path()).unwrap();
        writeln!(file, "{{\"truncated\":").unwrap();

        assert_eq!(store.base_forecasts().unwrap().len(), 1);
    }

    #[test]
    fn missing_files_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlForecastStore::new(dir.path().join("nested")).unwrap();
        assert!(store.base_forecasts().unwrap().is_empty());
        assert!(store
            .find_conformal("SPY", trading_day(0), "garch11")
            .unwrap()
            .is_none());
    }
}
