//! Parallel calibration across symbols.
//!
//! Symbols are independent, so each request runs on the rayon pool. Same-symbol
//! requests still serialize on the orchestrator's per-symbol lock. A failure is
//! reported for its symbol and never affects the others.

use rayon::prelude::*;

use conflab_core::domain::{ConformalForecast, Domain};
use conflab_core::store::{ForecastStore, StateStore, TargetSpecResolver};
use conflab_core::{CalibrationError, CalibrationOrchestrator, CalibrationRequest};

/// Result of calibrating one symbol.
#[derive(Debug)]
pub struct SymbolOutcome {
    pub symbol: String,
    pub result: Result<ConformalForecast, CalibrationError>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<SymbolOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn errors(&self) -> impl Iterator<Item = (&str, &CalibrationError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.symbol.as_str(), e)))
    }
}

/// Calibrate every request in parallel. Outcomes keep the request order.
pub fn calibrate_symbols<F, S, T>(
    orchestrator: &CalibrationOrchestrator<F, S, T>,
    requests: &[CalibrationRequest],
) -> BatchSummary
where
    F: ForecastStore,
    S: StateStore,
    T: TargetSpecResolver,
{
    let outcomes: Vec<SymbolOutcome> = requests
        .par_iter()
        .map(|req| SymbolOutcome {
            symbol: req.symbol.clone(),
            result: orchestrator.calibrate(req),
        })
        .collect();

    let summary = BatchSummary { outcomes };
    tracing::info!(
        total = summary.outcomes.len(),
        succeeded = summary.succeeded(),
        failed = summary.failed(),
        "batch calibration complete"
    );
    summary
}

/// One request per symbol with shared flags.
pub fn requests_for(symbols: &[String], domain: Domain, recompute: bool) -> Vec<CalibrationRequest> {
    symbols
        .iter()
        .map(|s| CalibrationRequest::new(s.clone(), domain).recompute(recompute))
        .collect()
}
