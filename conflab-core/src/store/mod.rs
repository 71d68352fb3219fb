//! Collaborator traits: forecast store, state store, target-spec resolver.
//!
//! The orchestrator only talks to these traits, so file-backed, database-backed
//! and in-memory implementations are interchangeable. In-memory versions live
//! in [`memory`] and back the tests.

pub mod memory;

use chrono::NaiveDate;

use crate::domain::{BaseForecast, ConformalForecast, Domain, RecordId, TargetSpec};
use crate::error::StoreError;
use crate::state::ConformalState;

pub use memory::{MemoryForecastStore, MemoryStateStore, StaticTargetSpecs};

/// Read and write access to base and conformal forecasts.
pub trait ForecastStore: Send + Sync {
    /// Base forecasts for `symbol` in `domain` with the given horizon and
    /// coverage. Unrealized and non-final records may be included; the window
    /// reader filters them.
    fn list_eligible_base_forecasts(
        &self,
        symbol: &str,
        domain: Domain,
        horizon: u32,
        coverage: f64,
        method: Option<&str>,
    ) -> Result<Vec<BaseForecast>, StoreError>;

    /// The most recent final base forecast for `symbol` in `domain`.
    fn latest_final_forecast(
        &self,
        symbol: &str,
        domain: Domain,
        method: Option<&str>,
    ) -> Result<Option<BaseForecast>, StoreError>;

    fn save_forecast(&self, forecast: &ConformalForecast) -> Result<RecordId, StoreError>;

    /// The stored conformal forecast for `(symbol, date_t, method)`, if any.
    fn find_conformal(
        &self,
        symbol: &str,
        date_t: NaiveDate,
        method: &str,
    ) -> Result<Option<ConformalForecast>, StoreError>;
}

/// Persistence for the one live [`ConformalState`] per symbol.
pub trait StateStore: Send + Sync {
    fn load(&self, symbol: &str) -> Result<Option<ConformalState>, StoreError>;

    fn save(&self, symbol: &str, state: &ConformalState) -> Result<(), StoreError>;

    /// Remove the state for `symbol`. Returns whether a state existed.
    fn delete(&self, symbol: &str) -> Result<bool, StoreError>;

    /// Symbols with a persisted state, sorted.
    fn symbols(&self) -> Result<Vec<String>, StoreError>;
}

/// Resolves the forecasting target (horizon, coverage) for a symbol.
pub trait TargetSpecResolver: Send + Sync {
    fn target_spec(&self, symbol: &str) -> Result<Option<TargetSpec>, StoreError>;
}

/// Whether `a` and `b` denote the same coverage level.
pub fn same_coverage(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Pick the newest final forecast among `candidates`. Ties on date go to the
/// lowest method name so the choice does not depend on storage order.
pub fn pick_latest_final<'a, I>(candidates: I) -> Option<&'a BaseForecast>
where
    I: IntoIterator<Item = &'a BaseForecast>,
{
    candidates
        .into_iter()
        .filter(|f| f.is_final)
        .max_by(|a, b| a.date_t.cmp(&b.date_t).then_with(|| b.method.cmp(&a.method)))
}
