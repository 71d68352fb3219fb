//! ConfLab CLI: import, calibrate, state and coverage commands.
//!
//! Commands:
//! - `import` appends base forecasts from a CSV file
//! - `calibrate` calibrates one symbol's latest final forecast
//! - `calibrate-all` calibrates every configured symbol in parallel
//! - `state show` / `state reset` inspect or clear persisted state
//! - `coverage` reports realized coverage per symbol

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use conflab_core::domain::{ConformalForecast, Domain};
use conflab_core::{CalibrationError, CalibrationRequest};
use conflab_runner::{
    calibrate_symbols, coverage_report, export_coverage_csv, import_base_forecasts_csv, open_orchestrator,
    render_table, requests_for, JsonlForecastStore, RunnerConfig,
};

#[derive(Parser)]
#[command(name = "conflab", about = "ConfLab CLI: online conformal calibration of forecast intervals")]
struct Cli {
    /// Path to the runner config file.
    #[arg(long, global = true, default_value = "conflab.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DomainArg {
    Log,
    Price,
}

impl From<DomainArg> for Domain {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Log => Domain::Log,
            DomainArg::Price => Domain::Price,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append base forecasts from a CSV file.
    Import {
        /// CSV file with one base forecast per row.
        csv: PathBuf,
    },
    /// Calibrate the latest final base forecast of one symbol.
    Calibrate {
        symbol: String,

        /// Calibration domain. Defaults to the config's default_domain.
        #[arg(long, value_enum)]
        domain: Option<DomainArg>,

        /// Calibrate this base method only.
        #[arg(long)]
        method: Option<String>,

        /// Adopt the requested domain even if state exists in the other one.
        #[arg(long, default_value_t = false)]
        force_domain: bool,

        /// Replace an existing calibration for the same date.
        #[arg(long, default_value_t = false)]
        recompute: bool,
    },
    /// Calibrate every symbol in the targets file.
    CalibrateAll {
        #[arg(long, value_enum)]
        domain: Option<DomainArg>,

        #[arg(long, default_value_t = false)]
        recompute: bool,
    },
    /// Inspect or reset persisted calibration state.
    State {
        #[command(subcommand)]
        action: StateAction,
    },
    /// Report realized coverage per symbol.
    Coverage {
        /// Write CSV to this file instead of printing a table.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum StateAction {
    /// Print a symbol's state as JSON.
    Show { symbol: String },
    /// Delete a symbol's state. The next calibration starts fresh.
    Reset {
        symbol: String,

        /// Actually delete (without this flag, only previews).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("conflab=info,conflab_core=info,conflab_runner=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunnerConfig::load(&cli.config)?;

    match cli.command {
        Commands::Import { csv } => run_import(&config, csv),
        Commands::Calibrate {
            symbol,
            domain,
            method,
            force_domain,
            recompute,
        } => run_calibrate(&config, symbol, domain, method, force_domain, recompute),
        Commands::CalibrateAll { domain, recompute } => run_calibrate_all(&config, domain, recompute),
        Commands::State { action } => match action {
            StateAction::Show { symbol } => run_state_show(&config, &symbol),
            StateAction::Reset { symbol, confirm } => run_state_reset(&config, &symbol, confirm),
        },
        Commands::Coverage { csv } => run_coverage(&config, csv),
    }
}

fn run_import(config: &RunnerConfig, csv: PathBuf) -> Result<()> {
    let forecasts = import_base_forecasts_csv(&csv)?;
    let store = JsonlForecastStore::new(&config.data_dir)
        .with_context(|| format!("failed to open forecast store in {}", config.data_dir.display()))?;
    let written = store.append_base(&forecasts)?;
    println!("Imported {written} base forecast(s) into {}", store.base_path().display());
    Ok(())
}

fn run_calibrate(
    config: &RunnerConfig,
    symbol: String,
    domain: Option<DomainArg>,
    method: Option<String>,
    force_domain: bool,
    recompute: bool,
) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let domain = domain.map_or(config.default_domain, Domain::from);
    let mut request = CalibrationRequest::new(symbol, domain)
        .force_domain(force_domain)
        .recompute(recompute);
    if let Some(m) = method {
        request = request.method(m);
    }

    match orch.calibrate(&request) {
        Ok(forecast) => {
            print_forecast(&forecast);
            Ok(())
        }
        Err(err) => fail(&request.symbol, &err),
    }
}

fn run_calibrate_all(config: &RunnerConfig, domain: Option<DomainArg>, recompute: bool) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let symbols = orch.targets().symbols();
    if symbols.is_empty() {
        println!("No targets configured in {}", config.targets_file.display());
        return Ok(());
    }

    let domain = domain.map_or(config.default_domain, Domain::from);
    let summary = calibrate_symbols(&orch, &requests_for(&symbols, domain, recompute));

    println!("{:<10} {:<10} {:>12} {:>12}", "Symbol", "Date", "Lower", "Upper");
    println!("{}", "-".repeat(47));
    for outcome in &summary.outcomes {
        if let Ok(f) = &outcome.result {
            println!("{:<10} {:<10} {:>12.4} {:>12.4}", f.symbol, f.date_t, f.lower, f.upper);
        }
    }
    for (symbol, err) in summary.errors() {
        eprintln!("Error for {symbol}: {err}");
        eprintln!("  hint: {}", err.hint());
    }
    println!();
    println!("Calibrated {}/{} symbol(s).", summary.succeeded(), summary.outcomes.len());

    if !summary.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_state_show(config: &RunnerConfig, symbol: &str) -> Result<()> {
    let orch = open_orchestrator(config)?;
    match orch.state(symbol)? {
        Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
        None => println!("No state for {symbol}"),
    }
    Ok(())
}

fn run_state_reset(config: &RunnerConfig, symbol: &str, confirm: bool) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let Some(state) = orch.state(symbol)? else {
        println!("No state for {symbol}");
        return Ok(());
    };

    println!(
        "{symbol}: {} {} state, last calibrated {}, {} hit(s) / {} miss(es)",
        state.mode, state.domain, state.last_date_t, state.tracking.hits, state.tracking.misses
    );
    if !confirm {
        println!();
        println!("Dry run. Pass --confirm to delete.");
        return Ok(());
    }

    orch.reset_state(symbol)?;
    println!("Removed state for {symbol}");
    Ok(())
}

fn run_coverage(config: &RunnerConfig, csv: Option<PathBuf>) -> Result<()> {
    let orch = open_orchestrator(config)?;
    let rows = coverage_report(orch.states())?;
    if rows.is_empty() {
        println!("No calibrated symbols yet.");
        return Ok(());
    }

    match csv {
        Some(path) => {
            let data = export_coverage_csv(&rows)?;
            std::fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {} row(s) to {}", rows.len(), path.display());
        }
        None => print!("{}", render_table(&rows)),
    }
    Ok(())
}

fn fail(symbol: &str, err: &CalibrationError) -> Result<()> {
    eprintln!("hint: {}", err.hint());
    bail!("calibration failed for {symbol}: {err}")
}

fn print_forecast(f: &ConformalForecast) {
    let p = &f.provenance;
    println!();
    println!("=== Conformal Forecast ===");
    println!("Symbol:    {}", f.symbol);
    println!("Date:      {} (h={})", f.date_t, f.horizon);
    println!("Method:    {}", f.method);
    println!("Mode:      {} ({} domain)", p.mode, f.domain);
    println!("Coverage:  {:.1}%", p.coverage * 100.0);
    println!();
    println!("Point:     {:.4}", f.point_estimate);
    println!("Interval:  [{:.4}, {:.4}]", f.lower, f.upper);
    println!("Width:     {:.4}", f.width());
    println!();
    match (p.window_start, p.window_end) {
        (Some(start), Some(end)) => println!("Window:    {} points, {start} to {end}", p.window_len),
        _ => println!("Window:    {} points", p.window_len),
    }
    println!("Feedback:  {} resolved", p.feedback_applied);
    if let Some(theta) = p.state.params.theta {
        println!("Theta:     {theta:+.5}");
    }
    if let Some(seed) = p.seed {
        println!("Seed:      {seed}");
    }
    println!("Record:    {}", f.record_id);
    println!();
}
