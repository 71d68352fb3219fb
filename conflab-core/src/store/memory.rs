//! In-memory collaborators for tests and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use parking_lot::RwLock;

use crate::domain::{BaseForecast, ConformalForecast, Domain, RecordId, TargetSpec};
use crate::error::StoreError;
use crate::state::ConformalState;

use super::{pick_latest_final, same_coverage, ForecastStore, StateStore, TargetSpecResolver};

#[derive(Debug, Default)]
pub struct MemoryForecastStore {
    base: RwLock<Vec<BaseForecast>>,
    conformal: RwLock<Vec<ConformalForecast>>,
    fail_saves: AtomicBool,
}

impl MemoryForecastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(forecasts: impl IntoIterator<Item = BaseForecast>) -> Self {
        let store = Self::new();
        store.base.write().extend(forecasts);
        store
    }

    pub fn insert_base(&self, forecast: BaseForecast) {
        self.base.write().push(forecast);
    }

    /// Record the realized outcome for a stored base forecast.
    pub fn realize(&self, symbol: &str, date_t: NaiveDate, outcome: f64) -> bool {
        let mut base = self.base.write();
        let mut found = false;
        for f in base.iter_mut().filter(|f| f.symbol == symbol && f.date_t == date_t) {
            f.realized_outcome = Some(outcome);
            found = true;
        }
        found
    }

    /// Make every subsequent `save_forecast` fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn conformal_forecasts(&self) -> Vec<ConformalForecast> {
        self.conformal.read().clone()
    }
}

impl ForecastStore for MemoryForecastStore {
    fn list_eligible_base_forecasts(
        &self,
        symbol: &str,
        domain: Domain,
        horizon: u32,
        coverage: f64,
        method: Option<&str>,
    ) -> Result<Vec<BaseForecast>, StoreError> {
        Ok(self
            .base
            .read()
            .iter()
            .filter(|f| f.symbol == symbol && f.domain == domain && f.horizon == horizon)
            .filter(|f| same_coverage(f.coverage, coverage))
            .filter(|f| method.map_or(true, |m| f.method == m))
            .cloned()
            .collect())
    }

    fn latest_final_forecast(
        &self,
        symbol: &str,
        domain: Domain,
        method: Option<&str>,
    ) -> Result<Option<BaseForecast>, StoreError> {
        let base = self.base.read();
        let candidates = base
            .iter()
            .filter(|f| f.symbol == symbol && f.domain == domain)
            .filter(|f| method.map_or(true, |m| f.method == m));
        Ok(pick_latest_final(candidates).cloned())
    }

    fn save_forecast(&self, forecast: &ConformalForecast) -> Result<RecordId, StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("forecast store unavailable".to_string()));
        }
        let mut conformal = self.conformal.write();
        conformal.retain(|c| {
            !(c.symbol == forecast.symbol && c.date_t == forecast.date_t && c.method == forecast.method)
        });
        conformal.push(forecast.clone());
        Ok(forecast.record_id.clone())
    }

    fn find_conformal(
        &self,
        symbol: &str,
        date_t: NaiveDate,
        method: &str,
    ) -> Result<Option<ConformalForecast>, StoreError> {
        Ok(self
            .conformal
            .read()
            .iter()
            .rev()
            .find(|c| c.symbol == symbol && c.date_t == date_t && c.method == method)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: RwLock<BTreeMap<String, ConformalState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, symbol: &str) -> Result<Option<ConformalState>, StoreError> {
        Ok(self.states.read().get(symbol).cloned())
    }

    fn save(&self, symbol: &str, state: &ConformalState) -> Result<(), StoreError> {
        self.states.write().insert(symbol.to_string(), state.clone());
        Ok(())
    }

    fn delete(&self, symbol: &str) -> Result<bool, StoreError> {
        Ok(self.states.write().remove(symbol).is_some())
    }

    fn symbols(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.states.read().keys().cloned().collect())
    }
}

/// Fixed target specs keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticTargetSpecs {
    specs: HashMap<String, TargetSpec>,
}

impl StaticTargetSpecs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, symbol: impl Into<String>, spec: TargetSpec) -> Self {
        self.specs.insert(symbol.into(), spec);
        self
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.specs.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl TargetSpecResolver for StaticTargetSpecs {
    fn target_spec(&self, symbol: &str) -> Result<Option<TargetSpec>, StoreError> {
        Ok(self.specs.get(symbol).cloned())
    }
}
