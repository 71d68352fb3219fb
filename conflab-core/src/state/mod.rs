//! Per-symbol conformal state and its transition function.
//!
//! State is never patched field-by-field. Every calibration builds the next
//! state with [`ConformalState::transition`], which names every field, so
//! adding a field is a compile error until the transition handles it.

pub mod tracking;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Domain, ForecastId, Mode};
use crate::modes::{ModeFields, ModeOutput};

pub use tracking::{CoverageTracking, IntervalOutcome, IssuedInterval, ResolvedOutcome, TRACKING_CAPACITY};

/// Calibration parameters of the latest calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformalParams {
    /// Raw calibration quantile (half-width of the residual band for EnbPI).
    pub q_cal: f64,
    /// Horizon factor applied to `q_cal`.
    pub horizon_scale: f64,
    /// `q_cal * horizon_scale`.
    pub q_cal_scaled: f64,
    pub delta_l: f64,
    pub delta_u: f64,
    /// ACI step size.
    pub eta: Option<f64>,
    /// ACI running adjustment level.
    pub theta: Option<f64>,
    /// EnbPI ensemble size.
    #[serde(rename = "K")]
    pub k: Option<u32>,
    /// EnbPI bootstrap seed.
    pub seed: Option<u64>,
}

impl ConformalParams {
    pub fn from_output(output: &ModeOutput) -> Self {
        let (eta, theta, k, seed) = match output.fields {
            ModeFields::Cqr => (None, None, None, None),
            ModeFields::Enbpi { k, seed } => (None, None, Some(k), Some(seed)),
            ModeFields::Aci { eta, theta } => (Some(eta), Some(theta), None, None),
        };
        Self {
            q_cal: output.q_cal,
            horizon_scale: output.horizon_scale,
            q_cal_scaled: output.q_cal_scaled(),
            delta_l: output.delta_l,
            delta_u: output.delta_u,
            eta,
            theta,
            k,
            seed,
        }
    }
}

/// One live calibration state per symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConformalState {
    pub symbol: String,
    pub domain: Domain,
    pub mode: Mode,
    /// Target coverage `1 - alpha`.
    pub coverage: f64,
    /// Number of calibration points used by the latest calibration.
    pub cal_window: usize,
    pub params: ConformalParams,
    #[serde(default)]
    pub tracking: CoverageTracking,
    pub last_date_t: NaiveDate,
    pub last_base_id: ForecastId,
    pub updated_at: DateTime<Utc>,
}

/// Inputs to a state transition.
#[derive(Debug, Clone)]
pub struct Transition<'a> {
    pub symbol: &'a str,
    pub domain: Domain,
    pub coverage: f64,
    pub cal_window: usize,
    pub output: &'a ModeOutput,
    pub resolved: &'a [ResolvedOutcome],
    pub issued: IssuedInterval,
    pub now: DateTime<Utc>,
}

impl ConformalState {
    /// Total transition `(Option<State>, Transition) -> State`.
    ///
    /// Tracking history carries over only when the domain is unchanged; a
    /// forced domain switch starts from a clean slate.
    pub fn transition(prior: Option<&ConformalState>, t: Transition<'_>) -> ConformalState {
        let mut tracking = match prior {
            Some(p) if p.domain == t.domain => p.tracking.clone(),
            _ => CoverageTracking::default(),
        };
        tracking.apply_resolved(t.resolved);
        let last_date_t = t.issued.date_t;
        let last_base_id = t.issued.base_id.clone();
        tracking.record_issued(t.issued);

        ConformalState {
            symbol: t.symbol.to_string(),
            domain: t.domain,
            mode: t.output.fields.mode(),
            coverage: t.coverage,
            cal_window: t.cal_window,
            params: ConformalParams::from_output(t.output),
            tracking,
            last_date_t,
            last_base_id,
            updated_at: t.now,
        }
    }

    pub fn alpha(&self) -> f64 {
        1.0 - self.coverage
    }

    /// Check the structural invariants of a loaded state.
    pub fn check_invariants(&self) -> Result<(), String> {
        let p = &self.params;
        let mode_fields_ok = match self.mode {
            Mode::Cqr => p.eta.is_none() && p.theta.is_none() && p.k.is_none() && p.seed.is_none(),
            Mode::Enbpi => p.eta.is_none() && p.theta.is_none() && p.k.is_some() && p.seed.is_some(),
            Mode::Aci => p.eta.is_some() && p.theta.is_some() && p.k.is_none() && p.seed.is_none(),
        };
        if !mode_fields_ok {
            return Err(format!("{}: mode-specific params do not match mode {}", self.symbol, self.mode));
        }
        if p.q_cal_scaled != p.q_cal * p.horizon_scale {
            return Err(format!(
                "{}: q_cal_scaled {} is not q_cal {} x horizon_scale {}",
                self.symbol, p.q_cal_scaled, p.q_cal, p.horizon_scale
            ));
        }
        if !(self.coverage > 0.0 && self.coverage < 1.0) {
            return Err(format!("{}: coverage {} outside (0, 1)", self.symbol, self.coverage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn output(fields: ModeFields) -> ModeOutput {
        ModeOutput {
            delta_l: 0.4,
            delta_u: 0.6,
            q_cal: 0.5,
            horizon_scale: 1.0,
            level_lo: 0.05,
            level_hi: 0.95,
            n_scores: 30,
            fields,
        }
    }

    fn issued(day: u32) -> IssuedInterval {
        IssuedInterval {
            date_t: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            base_id: ForecastId::new(format!("b{day}")),
            lower: 97.0,
            upper: 103.0,
            outcome: None,
        }
    }

    fn transition<'a>(out: &'a ModeOutput, domain: Domain, day: u32) -> Transition<'a> {
        Transition {
            symbol: "SPY",
            domain,
            coverage: 0.9,
            cal_window: 30,
            output: out,
            resolved: &[],
            issued: issued(day),
            now: Utc.with_ymd_and_hms(2024, 6, day, 21, 0, 0).unwrap(),
        }
    }

    #[test]
    fn mode_fields_null_outside_their_mode() {
        let out = output(ModeFields::Cqr);
        let s = ConformalState::transition(None, transition(&out, Domain::Log, 3));
        assert_eq!(s.mode, Mode::Cqr);
        assert!(s.params.eta.is_none() && s.params.theta.is_none());
        assert!(s.params.k.is_none() && s.params.seed.is_none());
        s.check_invariants().unwrap();
    }

    #[test]
    fn enbpi_params_carry_k_and_seed() {
        let out = output(ModeFields::Enbpi { k: 20, seed: 99 });
        let s = ConformalState::transition(None, transition(&out, Domain::Log, 3));
        assert_eq!(s.params.k, Some(20));
        assert_eq!(s.params.seed, Some(99));
        s.check_invariants().unwrap();
    }

    #[test]
    fn q_cal_scaled_derived_from_q_cal() {
        let mut out = output(ModeFields::Cqr);
        out.horizon_scale = 2.0;
        let s = ConformalState::transition(None, transition(&out, Domain::Price, 3));
        assert_eq!(s.params.q_cal_scaled, 1.0);
    }

    #[test]
    fn domain_switch_drops_tracking() {
        let out = output(ModeFields::Cqr);
        let first = ConformalState::transition(None, transition(&out, Domain::Log, 3));
        assert_eq!(first.tracking.issued.len(), 1);

        let same = ConformalState::transition(Some(&first), transition(&out, Domain::Log, 4));
        assert_eq!(same.tracking.issued.len(), 2);

        let switched = ConformalState::transition(Some(&first), transition(&out, Domain::Price, 4));
        assert_eq!(switched.tracking.issued.len(), 1);
        assert_eq!(switched.domain, Domain::Price);
    }

    #[test]
    fn json_roundtrip_is_exact() {
        let mut out = output(ModeFields::Aci { eta: 0.01, theta: -0.009_499_999_999_999_999 });
        out.q_cal = 0.1 + 0.2;
        let s = ConformalState::transition(None, transition(&out, Domain::Log, 3));
        let json = serde_json::to_string(&s).unwrap();
        let back: ConformalState = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
        assert_eq!(s.params.theta.unwrap().to_bits(), back.params.theta.unwrap().to_bits());
    }

    #[test]
    fn corrupted_mode_fields_fail_invariants() {
        let out = output(ModeFields::Cqr);
        let mut s = ConformalState::transition(None, transition(&out, Domain::Log, 3));
        s.params.theta = Some(0.1);
        assert!(s.check_invariants().is_err());
    }
}
