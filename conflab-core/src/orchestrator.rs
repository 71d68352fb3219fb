//! Calibration orchestrator.
//!
//! One call takes a symbol from `Idle` through `Validating`, `Loading`,
//! `Computing` and `Persisting` to `Done`, or stops in `Rejected` with a typed
//! error. Configuration is checked before any I/O. The per-symbol lock is held
//! from `Loading` through `Persisting`, so same-symbol calibrations never
//! interleave while different symbols proceed independently.
//!
//! Persisting writes the next state first and then the conformal forecast. If
//! the forecast write fails the prior state is put back (or the new one
//! removed when there was none).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::clock::{Clock, SystemClock};
use crate::domain::{BaseForecast, ConformalForecast, Domain, Provenance, RecordId, TargetSpec};
use crate::error::{CalibrationError, StoreError};
use crate::locks::SymbolLocks;
use crate::modes::{check_coverage, CalibrationInput, ModeConfig, ModeEngine};
use crate::score::NonconformityScorer;
use crate::state::{ConformalState, IssuedInterval, Transition};
use crate::store::{same_coverage, ForecastStore, StateStore, TargetSpecResolver};
use crate::window::{CalibrationWindowReader, WindowQuery};

/// Engine configuration shared by every calibration an orchestrator runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default)]
    pub mode: ModeConfig,
    /// Trading dates in the calibration window.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Minimum window points accepted by the engine.
    #[serde(default = "default_min_points")]
    pub min_points: usize,
}

fn default_window_size() -> usize {
    60
}

fn default_min_points() -> usize {
    10
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mode: ModeConfig::default(),
            window_size: default_window_size(),
            min_points: default_min_points(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_mode(mut self, mode: ModeConfig) -> Self {
        self.mode = mode;
        self
    }

    /// Build the engine and check the window settings.
    pub fn build_engine(&self) -> Result<Box<dyn ModeEngine>, CalibrationError> {
        if self.window_size == 0 {
            return Err(CalibrationError::InvalidConfig {
                message: "window_size must be at least 1".to_string(),
            });
        }
        let engine = self.mode.build(self.min_points)?;
        if engine.min_points() > self.window_size {
            return Err(CalibrationError::InvalidConfig {
                message: format!(
                    "window_size {} is smaller than the {} minimum of {} points",
                    self.window_size,
                    engine.mode(),
                    engine.min_points()
                ),
            });
        }
        Ok(engine)
    }
}

/// One calibration request.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRequest {
    pub symbol: String,
    pub domain: Domain,
    /// Calibrate this base method only; the latest final method otherwise.
    pub method: Option<String>,
    /// Adopt `domain` even if the persisted state uses the other one.
    pub force_domain: bool,
    /// Replace an existing calibration for the same date.
    pub recompute: bool,
}

impl CalibrationRequest {
    pub fn new(symbol: impl Into<String>, domain: Domain) -> Self {
        Self {
            symbol: symbol.into(),
            domain,
            method: None,
            force_domain: false,
            recompute: false,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn force_domain(mut self, force: bool) -> Self {
        self.force_domain = force;
        self
    }

    pub fn recompute(mut self, recompute: bool) -> Self {
        self.recompute = recompute;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    Loading,
    Computing,
    Persisting,
    Done,
    Rejected,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::Loading => "loading",
            Phase::Computing => "computing",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

pub struct CalibrationOrchestrator<F, S, T> {
    forecasts: F,
    states: S,
    targets: T,
    config: CalibrationConfig,
    clock: Arc<dyn Clock>,
    locks: SymbolLocks,
}

impl<F, S, T> CalibrationOrchestrator<F, S, T>
where
    F: ForecastStore,
    S: StateStore,
    T: TargetSpecResolver,
{
    pub fn new(forecasts: F, states: S, targets: T, config: CalibrationConfig) -> Self {
        Self {
            forecasts,
            states,
            targets,
            config,
            clock: Arc::new(SystemClock),
            locks: SymbolLocks::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn forecasts(&self) -> &F {
        &self.forecasts
    }

    pub fn states(&self) -> &S {
        &self.states
    }

    pub fn targets(&self) -> &T {
        &self.targets
    }

    /// Current persisted state for `symbol`.
    pub fn state(&self, symbol: &str) -> Result<Option<ConformalState>, CalibrationError> {
        Ok(self.states.load(symbol)?)
    }

    /// Operator reset: delete the persisted state. Returns whether one existed.
    pub fn reset_state(&self, symbol: &str) -> Result<bool, CalibrationError> {
        let existed = self.locks.with_lock(symbol, || self.states.delete(symbol))?;
        if existed {
            warn!(symbol, "calibration state reset by operator");
        }
        Ok(existed)
    }

    /// Run one calibration and return the emitted conformal forecast.
    pub fn calibrate(&self, request: &CalibrationRequest) -> Result<ConformalForecast, CalibrationError> {
        let span = info_span!("calibrate", symbol = %request.symbol, domain = %request.domain);
        let _enter = span.enter();
        debug!(phase = %Phase::Idle);

        match self.run(request) {
            Ok(forecast) => {
                debug!(phase = %Phase::Done);
                Ok(forecast)
            }
            Err(err) => {
                warn!(phase = %Phase::Rejected, status = err.status_code(), error = %err, "calibration rejected");
                Err(err)
            }
        }
    }

    fn run(&self, request: &CalibrationRequest) -> Result<ConformalForecast, CalibrationError> {
        debug!(phase = %Phase::Validating);
        let engine = self.config.build_engine()?;
        let target = self
            .targets
            .target_spec(&request.symbol)?
            .ok_or_else(|| CalibrationError::TargetSpecNotFound {
                symbol: request.symbol.clone(),
            })?;
        check_coverage(target.coverage)?;

        self.locks
            .with_lock(&request.symbol, || self.run_locked(request, engine.as_ref(), &target))
    }

    fn run_locked(
        &self,
        request: &CalibrationRequest,
        engine: &dyn ModeEngine,
        target: &TargetSpec,
    ) -> Result<ConformalForecast, CalibrationError> {
        let symbol = request.symbol.as_str();
        let domain = request.domain;

        let prior = self.states.load(symbol)?;
        if let Some(p) = &prior {
            p.check_invariants()
                .map_err(|msg| StoreError::Serialization(format!("corrupt state: {msg}")))?;
            if p.domain != domain {
                if !request.force_domain {
                    return Err(CalibrationError::DomainConflict {
                        symbol: symbol.to_string(),
                        persisted: p.domain,
                        requested: domain,
                    });
                }
                warn!(persisted = %p.domain, requested = %domain, "forced domain change, discarding prior state");
            }
        }
        let carried = prior.as_ref().filter(|p| p.domain == domain);

        debug!(phase = %Phase::Loading);
        let today = self.load_today(request, target)?;
        if !request.recompute
            && self
                .forecasts
                .find_conformal(symbol, today.date_t, &today.method)?
                .is_some()
        {
            return Err(CalibrationError::AlreadyCalibrated {
                symbol: symbol.to_string(),
                date_t: today.date_t,
                method: today.method.clone(),
            });
        }

        let window = CalibrationWindowReader::new(&self.forecasts).read(&WindowQuery {
            symbol,
            method: request.method.as_deref(),
            domain,
            horizon: target.horizon,
            coverage: target.coverage,
            window_size: self.config.window_size,
            today: today.date_t,
        })?;
        if window.is_empty() {
            return Err(CalibrationError::NoBaseForecastFound {
                symbol: symbol.to_string(),
                detail: format!("no realized {domain}-domain base forecasts before {}", today.date_t),
            });
        }
        if window.len() < engine.min_points() {
            return Err(CalibrationError::InsufficientBaseForecasts {
                symbol: symbol.to_string(),
                mode: engine.mode(),
                have: window.len(),
                need: engine.min_points(),
            });
        }
        debug!(window_len = window.len(), base_id = %today.id, "window loaded");

        debug!(phase = %Phase::Computing);
        let prior_params = carried.filter(|p| p.mode == engine.mode()).map(|p| &p.params);
        let feedback = carried
            .map(|p| p.tracking.resolve_pending(&window, domain, today.date_t))
            .unwrap_or_default();
        let output = engine.calibrate(&CalibrationInput {
            window: &window,
            target: &today,
            domain,
            coverage: target.coverage,
            prior: prior_params,
            feedback: &feedback,
        })?;

        debug!(phase = %Phase::Persisting);
        let view = NonconformityScorer::coverage(domain).view(&today)?;
        let lower_domain = view.lower - output.delta_l;
        let upper_domain = view.upper + output.delta_u;
        let now = self.clock.now();

        let next = ConformalState::transition(
            carried,
            Transition {
                symbol,
                domain,
                coverage: target.coverage,
                cal_window: window.len(),
                output: &output,
                resolved: &feedback,
                issued: IssuedInterval {
                    date_t: today.date_t,
                    base_id: today.id.clone(),
                    lower: lower_domain,
                    upper: upper_domain,
                    outcome: None,
                },
                now,
            },
        );

        let mode = engine.mode();
        let forecast = ConformalForecast {
            record_id: RecordId::derive(symbol, today.date_t, &today.method, mode.as_str(), now),
            symbol: symbol.to_string(),
            date_t: today.date_t,
            horizon: today.horizon,
            method: today.method.clone(),
            base_forecast_id: today.id.clone(),
            domain,
            lower_domain,
            upper_domain,
            lower: domain.to_level(today.origin_price, lower_domain),
            upper: domain.to_level(today.origin_price, upper_domain),
            point_estimate: today.point_estimate,
            created_at: now,
            provenance: Provenance {
                mode,
                coverage: target.coverage,
                alpha: target.alpha(),
                level_lo: output.level_lo,
                level_hi: output.level_hi,
                window_len: window.len(),
                window_start: window.first().map(|f| f.date_t),
                window_end: window.last().map(|f| f.date_t),
                n_scores: output.n_scores,
                feedback_applied: feedback.len(),
                seed: next.params.seed,
                state: next.clone(),
            },
        };

        self.states.save(symbol, &next)?;
        if let Err(err) = self.forecasts.save_forecast(&forecast) {
            self.roll_back(symbol, prior.as_ref());
            return Err(err.into());
        }

        info!(
            mode = %mode,
            date_t = %today.date_t,
            window_len = window.len(),
            feedback = feedback.len(),
            delta_l = output.delta_l,
            delta_u = output.delta_u,
            lower = forecast.lower,
            upper = forecast.upper,
            "calibrated"
        );
        Ok(forecast)
    }

    fn load_today(&self, request: &CalibrationRequest, target: &TargetSpec) -> Result<BaseForecast, CalibrationError> {
        let symbol = request.symbol.as_str();
        let today = self
            .forecasts
            .latest_final_forecast(symbol, request.domain, request.method.as_deref())?
            .ok_or_else(|| CalibrationError::NoBaseForecastFound {
                symbol: symbol.to_string(),
                detail: format!("no final {}-domain base forecast", request.domain),
            })?;
        if today.horizon != target.horizon || !same_coverage(today.coverage, target.coverage) {
            return Err(CalibrationError::NoBaseForecastFound {
                symbol: symbol.to_string(),
                detail: format!(
                    "latest base forecast {} has horizon {} and coverage {}, target is horizon {} and coverage {}",
                    today.id, today.horizon, today.coverage, target.horizon, target.coverage
                ),
            });
        }
        Ok(today)
    }

    fn roll_back(&self, symbol: &str, prior: Option<&ConformalState>) {
        let restored = match prior {
            Some(p) => self.states.save(symbol, p),
            None => self.states.delete(symbol).map(|_| ()),
        };
        match restored {
            Ok(()) => warn!("forecast save failed, state rolled back"),
            Err(err) => error!(error = %err, "forecast save failed and state rollback failed"),
        }
    }
}
