//! Calibration window selection.
//!
//! The window is the most recent run of realized, final base forecasts
//! strictly before today, one per trading date, ascending by date. It may be
//! shorter than requested; deciding whether that is enough is the caller's job.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::{BaseForecast, Domain};
use crate::error::StoreError;
use crate::store::{same_coverage, ForecastStore};

/// Parameters of one window read.
#[derive(Debug, Clone, Copy)]
pub struct WindowQuery<'a> {
    pub symbol: &'a str,
    /// Restrict to one base method; any final method otherwise.
    pub method: Option<&'a str>,
    pub domain: Domain,
    pub horizon: u32,
    pub coverage: f64,
    pub window_size: usize,
    pub today: NaiveDate,
}

/// Read-only window reader over a forecast store.
pub struct CalibrationWindowReader<'s, F: ForecastStore + ?Sized> {
    store: &'s F,
}

impl<'s, F: ForecastStore + ?Sized> CalibrationWindowReader<'s, F> {
    pub fn new(store: &'s F) -> Self {
        Self { store }
    }

    pub fn read(&self, query: &WindowQuery<'_>) -> Result<Vec<BaseForecast>, StoreError> {
        let candidates = self.store.list_eligible_base_forecasts(
            query.symbol,
            query.domain,
            query.horizon,
            query.coverage,
            query.method,
        )?;
        Ok(select_window(candidates, query))
    }
}

/// Apply the window rules to an arbitrary candidate list.
pub fn select_window(candidates: Vec<BaseForecast>, query: &WindowQuery<'_>) -> Vec<BaseForecast> {
    let mut by_date: BTreeMap<NaiveDate, BaseForecast> = BTreeMap::new();
    for f in candidates {
        let eligible = f.symbol == query.symbol
            && f.domain == query.domain
            && f.horizon == query.horizon
            && same_coverage(f.coverage, query.coverage)
            && f.is_final
            && f.is_realized()
            && f.date_t < query.today
            && query.method.map_or(true, |m| f.method == m);
        if !eligible {
            continue;
        }
        match by_date.get(&f.date_t) {
            Some(existing) if existing.method <= f.method => {}
            _ => {
                by_date.insert(f.date_t, f);
            }
        }
    }

    let skip = by_date.len().saturating_sub(query.window_size);
    by_date.into_values().skip(skip).collect()
}
