//! ConfLab Core: online conformal calibration of base forecast intervals.
//!
//! This crate contains the calibration engine:
//! - Domain types (base forecasts, conformal forecasts, target specs, ids)
//! - Nonconformity scoring in log or price coordinates
//! - Linear-interpolation quantiles shared by every mode
//! - Calibration window selection over a forecast store
//! - CQR, EnbPI and ACI behind one `ModeEngine` trait
//! - Per-symbol conformal state with a total transition function and coverage tracking
//! - The orchestrator that validates, loads, computes and persists one calibration

pub mod clock;
pub mod domain;
pub mod error;
pub mod locks;
pub mod modes;
pub mod orchestrator;
pub mod quantile;
pub mod rng;
pub mod score;
pub mod state;
pub mod store;
pub mod test_helpers;
pub mod window;

pub use error::{CalibrationError, StoreError};
pub use orchestrator::{CalibrationConfig, CalibrationOrchestrator, CalibrationRequest};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: shared types are Send + Sync so batch calibration
    /// can fan out across threads.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::BaseForecast>();
        require_sync::<domain::BaseForecast>();
        require_send::<domain::ConformalForecast>();
        require_sync::<domain::ConformalForecast>();
        require_send::<state::ConformalState>();
        require_sync::<state::ConformalState>();
        require_send::<CalibrationError>();
        require_sync::<CalibrationError>();

        require_send::<Box<dyn modes::ModeEngine>>();
        require_sync::<Box<dyn modes::ModeEngine>>();

        require_send::<
            CalibrationOrchestrator<store::MemoryForecastStore, store::MemoryStateStore, store::StaticTargetSpecs>,
        >();
        require_sync::<
            CalibrationOrchestrator<store::MemoryForecastStore, store::MemoryStateStore, store::StaticTargetSpecs>,
        >();
    }
}
