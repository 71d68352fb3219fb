use serde::{Deserialize, Serialize};

/// Resolved forecasting target for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Horizon in trading days.
    pub horizon: u32,
    /// Target coverage `1 - alpha`.
    pub coverage: f64,
    /// IANA timezone of the listing exchange (informational).
    #[serde(default = "default_tz")]
    pub exchange_tz: String,
}

fn default_tz() -> String {
    "America/New_York".to_string()
}

impl TargetSpec {
    pub fn alpha(&self) -> f64 {
        1.0 - self.coverage
    }
}
