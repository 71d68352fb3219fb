//! Domain types for ConfLab

pub mod conformal;
pub mod forecast;
pub mod ids;
pub mod mode;
pub mod target;

pub use conformal::{ConformalForecast, Provenance};
pub use forecast::{BaseForecast, Domain, DomainView, ForecastError};
pub use ids::{ForecastId, RecordId};
pub use mode::Mode;
pub use target::TargetSpec;

/// Symbol type alias
pub type Symbol = String;
