//! End-to-end calibration over the file-backed stores.
//!
//! Tests:
//! 1. CSV import, ACI calibration, outcome feedback across a store reopen
//! 2. Recalibration is rejected without recompute and idempotent with it
//! 3. Batch calibration over configured targets and the coverage report

use std::fmt::Write as _;
use std::path::Path;

use conflab_core::domain::{BaseForecast, Domain, Mode};
use conflab_core::store::ForecastStore;
use conflab_core::test_helpers::{next_forecast, noisy_window, trading_day};
use conflab_core::{CalibrationError, CalibrationRequest};
use conflab_runner::{
    calibrate_symbols, coverage_report, export_coverage_csv, import_base_forecasts_csv, open_orchestrator,
    requests_for, RunnerConfig,
};

const CONFIG: &str = r#"
data_dir = "data"
targets_file = "targets.toml"

[calibration]
window_size = 40

[calibration.mode]
type = "aci"
eta = 0.01
"#;

const TARGETS: &str = r#"
[targets.SPY]
horizon = 1
coverage = 0.9

[targets.QQQ]
horizon = 1
coverage = 0.9
"#;

/// Helper: write config, targets and return the loaded config.
fn setup(dir: &Path) -> RunnerConfig {
    std::fs::write(dir.join("conflab.toml"), CONFIG).unwrap();
    std::fs::write(dir.join("targets.toml"), TARGETS).unwrap();
    RunnerConfig::load(&dir.join("conflab.toml")).unwrap()
}

/// Helper: render forecasts in the import CSV layout.
fn write_csv(path: &Path, forecasts: &[BaseForecast]) {
    let mut out = String::from(
        "id,symbol,date_t,method,domain,horizon,coverage,origin_price,point_estimate,lower,upper,realized_outcome,is_final\n",
    );
    for f in forecasts {
        let realized = f.realized_outcome.map(|r| r.to_string()).unwrap_or_default();
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{}",
            f.id,
            f.symbol,
            f.date_t,
            f.method,
            f.domain.as_str(),
            f.horizon,
            f.coverage,
            f.origin_price,
            f.point_estimate,
            f.lower,
            f.upper,
            realized,
            f.is_final
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

/// Helper: a 30-day realized log window plus today's open forecast.
fn history(symbol: &str, seed: u64) -> Vec<BaseForecast> {
    let mut window = noisy_window(symbol, 30, seed, Domain::Log, 0.9);
    let today = next_forecast(&window, 30);
    window.push(today);
    window
}

// ── 1. Import, calibrate, feedback across reopen ─────────────────────

#[test]
fn feedback_survives_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let csv_path = dir.path().join("spy.csv");
    write_csv(&csv_path, &history("SPY", 11));
    let imported = import_base_forecasts_csv(&csv_path).unwrap();
    assert_eq!(imported.len(), 31);

    let first = {
        let orch = open_orchestrator(&config).unwrap();
        orch.forecasts().append_base(&imported).unwrap();
        orch.calibrate(&CalibrationRequest::new("SPY", Domain::Log)).unwrap()
    };
    assert_eq!(first.provenance.mode, Mode::Aci);
    assert!(first.lower < first.point_estimate && first.point_estimate < first.upper);
    assert!(config.state_dir().join("SPY.json").exists());

    // Today's outcome lands far outside the issued interval.
    let orch = open_orchestrator(&config).unwrap();
    let origin = imported[30].origin_price;
    assert_eq!(orch.forecasts().record_outcome("SPY", trading_day(30), origin * 1.5).unwrap(), 1);

    let realized_today = orch.forecasts().base_forecasts().unwrap();
    let tomorrow = next_forecast(&realized_today, 31);
    orch.forecasts().append_base(&[tomorrow]).unwrap();

    let second = orch.calibrate(&CalibrationRequest::new("SPY", Domain::Log)).unwrap();
    assert_eq!(second.date_t, trading_day(31));
    assert_eq!(second.provenance.feedback_applied, 1);

    let state = orch.state("SPY").unwrap().unwrap();
    assert_eq!(state.tracking.misses, 1);
    assert_eq!(state.tracking.hits, 0);
    let theta = state.params.theta.unwrap();
    assert!((theta - 0.01 * (0.1 - 1.0)).abs() < 1e-12, "theta {theta}");
    assert_eq!(orch.forecasts().conformal_forecasts().unwrap().len(), 2);
}

// ── 2. Recompute ─────────────────────────────────────────────────────

#[test]
fn recompute_replaces_without_changing_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let orch = open_orchestrator(&config).unwrap();
    orch.forecasts().append_base(&history("SPY", 3)).unwrap();

    let req = CalibrationRequest::new("SPY", Domain::Log);
    let first = orch.calibrate(&req).unwrap();
    let before = orch.state("SPY").unwrap().unwrap();

    assert!(matches!(
        orch.calibrate(&req),
        Err(CalibrationError::AlreadyCalibrated { .. })
    ));

    let again = orch.calibrate(&req.clone().recompute(true)).unwrap();
    assert_eq!(again.lower, first.lower);
    assert_eq!(again.upper, first.upper);

    let after = orch.state("SPY").unwrap().unwrap();
    assert_eq!(after.params, before.params);
    assert_eq!(after.tracking.hits + after.tracking.misses, 0);

    let found = orch
        .forecasts()
        .find_conformal("SPY", trading_day(30), &first.method)
        .unwrap()
        .unwrap();
    assert_eq!(found.record_id, again.record_id);
}

// ── 3. Batch and report ──────────────────────────────────────────────

#[test]
fn batch_over_targets_then_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());
    let orch = open_orchestrator(&config).unwrap();
    orch.forecasts().append_base(&history("SPY", 5)).unwrap();

    let symbols = orch.targets().symbols();
    assert_eq!(symbols, vec!["QQQ".to_string(), "SPY".to_string()]);
    let summary = calibrate_symbols(&orch, &requests_for(&symbols, Domain::Log, false));
    assert_eq!(summary.succeeded(), 1);
    let (failed, err) = summary.errors().next().unwrap();
    assert_eq!(failed, "QQQ");
    assert!(matches!(err, CalibrationError::NoBaseForecastFound { .. }));

    let rows = coverage_report(orch.states()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].symbol, "SPY");
    assert_eq!(rows[0].pending, 1);
    assert_eq!(rows[0].theta, Some(0.0));

    let csv = export_coverage_csv(&rows).unwrap();
    assert!(csv.lines().nth(1).unwrap().starts_with("SPY,log,ACI"));
}
