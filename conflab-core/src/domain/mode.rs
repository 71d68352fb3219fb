use serde::{Deserialize, Serialize};
use std::fmt;

/// Calibration algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Conformalized quantile regression: symmetric widening.
    #[serde(rename = "CQR")]
    Cqr,
    /// Ensemble bootstrap prediction intervals: asymmetric widening.
    #[serde(rename = "EnbPI")]
    Enbpi,
    /// Adaptive conformal inference: feedback-driven quantile level.
    #[serde(rename = "ACI")]
    Aci,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Cqr => "CQR",
            Mode::Enbpi => "EnbPI",
            Mode::Aci => "ACI",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_conventional_names() {
        assert_eq!(serde_json::to_string(&Mode::Enbpi).unwrap(), "\"EnbPI\"");
        let m: Mode = serde_json::from_str("\"ACI\"").unwrap();
        assert_eq!(m, Mode::Aci);
    }
}
