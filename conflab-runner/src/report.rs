//! Coverage reporting from persisted calibration state.
//!
//! Two formats:
//! - a fixed-width text table for the terminal
//! - CSV for external analysis tools

use anyhow::{Context, Result};
use serde::Serialize;

use conflab_core::domain::{Domain, Mode};
use conflab_core::state::ConformalState;
use conflab_core::store::StateStore;

/// Coverage summary for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageRow {
    pub symbol: String,
    pub domain: Domain,
    pub mode: Mode,
    pub target_coverage: f64,
    pub hits: u64,
    pub misses: u64,
    pub pending: usize,
    /// Hit rate over all resolved intervals.
    pub lifetime_hit_rate: Option<f64>,
    /// Hit rate over the retained intervals.
    pub recent_hit_rate: Option<f64>,
    pub theta: Option<f64>,
    pub last_date_t: chrono::NaiveDate,
}

impl CoverageRow {
    pub fn from_state(state: &ConformalState) -> Self {
        let t = &state.tracking;
        let resolved = t.hits + t.misses;
        Self {
            symbol: state.symbol.clone(),
            domain: state.domain,
            mode: state.mode,
            target_coverage: state.coverage,
            hits: t.hits,
            misses: t.misses,
            pending: t.pending(),
            lifetime_hit_rate: (resolved > 0).then(|| t.hits as f64 / resolved as f64),
            recent_hit_rate: t.recent_hit_rate(),
            theta: state.params.theta,
            last_date_t: state.last_date_t,
        }
    }

    /// Realized coverage minus target, when anything has resolved.
    pub fn coverage_gap(&self) -> Option<f64> {
        self.lifetime_hit_rate.map(|r| r - self.target_coverage)
    }
}

/// One row per symbol with persisted state, sorted by symbol.
pub fn coverage_report<S: StateStore>(states: &S) -> Result<Vec<CoverageRow>> {
    let mut rows = Vec::new();
    for symbol in states.symbols().context("failed to list calibrated symbols")? {
        let state = states
            .load(&symbol)
            .with_context(|| format!("failed to load state for {symbol}"))?;
        if let Some(state) = state {
            rows.push(CoverageRow::from_state(&state));
        }
    }
    Ok(rows)
}

fn pct(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |r| format!("{:.1}%", r * 100.0))
}

/// Render rows as a fixed-width table.
pub fn render_table(rows: &[CoverageRow]) -> String {
    let mut out = format!(
        "{:<10} {:<6} {:<6} {:>7} {:>6} {:>6} {:>7} {:>9} {:>9} {:>10}  {}\n",
        "symbol", "domain", "mode", "target", "hits", "misses", "pending", "lifetime", "recent", "theta", "last"
    );
    for r in rows {
        let theta = r.theta.map_or_else(|| "-".to_string(), |t| format!("{t:+.5}"));
        out.push_str(&format!(
            "{:<10} {:<6} {:<6} {:>7} {:>6} {:>6} {:>7} {:>9} {:>9} {:>10}  {}\n",
            r.symbol,
            r.domain.as_str(),
            r.mode.as_str(),
            pct(Some(r.target_coverage)),
            r.hits,
            r.misses,
            r.pending,
            pct(r.lifetime_hit_rate),
            pct(r.recent_hit_rate),
            theta,
            r.last_date_t
        ));
    }
    out
}

/// Export rows as CSV.
pub fn export_coverage_csv(rows: &[CoverageRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "symbol",
        "domain",
        "mode",
        "target_coverage",
        "hits",
        "misses",
        "pending",
        "lifetime_hit_rate",
        "recent_hit_rate",
        "theta",
        "last_date_t",
    ])?;
    let opt = |v: Option<f64>| v.map_or_else(String::new, |x| format!("{x:.6}"));
    for r in rows {
        wtr.write_record([
            r.symbol.as_str(),
            r.domain.as_str(),
            r.mode.as_str(),
            &format!("{:.4}", r.target_coverage),
            &r.hits.to_string(),
            &r.misses.to_string(),
            &r.pending.to_string(),
            &opt(r.lifetime_hit_rate),
            &opt(r.recent_hit_rate),
            &opt(r.theta),
            &r.last_date_t.to_string(),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}
