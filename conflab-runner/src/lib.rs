//! ConfLab Runner: file-backed calibration on top of `conflab-core`.
//!
//! This crate provides:
//! - TOML runner configuration and per-symbol target specs
//! - JSONL forecast logs and per-symbol JSON state files
//! - CSV import of base forecasts
//! - Parallel calibration across symbols
//! - Coverage reports from persisted state

pub mod batch;
pub mod config;
pub mod forecast_store;
pub mod import;
pub mod report;
pub mod state_store;
pub mod targets;

use anyhow::{Context, Result};
use conflab_core::CalibrationOrchestrator;

pub use batch::{calibrate_symbols, requests_for, BatchSummary, SymbolOutcome};
pub use config::{ConfigError, RunnerConfig};
pub use forecast_store::JsonlForecastStore;
pub use import::{import_base_forecasts_csv, read_base_forecasts_csv, ImportError};
pub use report::{coverage_report, export_coverage_csv, render_table, CoverageRow};
pub use state_store::JsonStateStore;
pub use targets::TargetSpecFile;

/// Orchestrator over the file-backed stores.
pub type FileOrchestrator = CalibrationOrchestrator<JsonlForecastStore, JsonStateStore, TargetSpecFile>;

/// Validate `config`, open its stores and load its target specs.
pub fn open_orchestrator(config: &RunnerConfig) -> Result<FileOrchestrator> {
    config.validate()?;
    let forecasts = JsonlForecastStore::new(&config.data_dir)
        .with_context(|| format!("failed to open forecast store in {}", config.data_dir.display()))?;
    let states = JsonStateStore::new(config.state_dir())
        .with_context(|| format!("failed to open state store in {}", config.state_dir().display()))?;
    let targets = TargetSpecFile::from_file(&config.targets_file)?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        targets = targets.len(),
        "opened file-backed stores"
    );
    Ok(CalibrationOrchestrator::new(
        forecasts,
        states,
        targets,
        config.calibration.clone(),
    ))
}

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn stores_are_send_sync() {
        assert_send::<JsonlForecastStore>();
        assert_sync::<JsonlForecastStore>();
        assert_send::<JsonStateStore>();
        assert_sync::<JsonStateStore>();
        assert_send::<TargetSpecFile>();
        assert_sync::<TargetSpecFile>();
    }

    #[test]
    fn file_orchestrator_is_send_sync() {
        assert_send::<FileOrchestrator>();
        assert_sync::<FileOrchestrator>();
    }

    #[test]
    fn report_types_are_send_sync() {
        assert_send::<CoverageRow>();
        assert_sync::<CoverageRow>();
        assert_send::<RunnerConfig>();
        assert_sync::<RunnerConfig>();
    }
}
