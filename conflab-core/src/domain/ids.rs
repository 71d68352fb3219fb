use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a base forecast record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForecastId(pub String);

impl ForecastId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Deterministic id for a base forecast without one of its own.
    ///
    /// Uses BLAKE3 over a canonical JSON object so the id is stable across
    /// builds and platforms.
    pub fn derive(symbol: &str, date_t: NaiveDate, method: &str, horizon: u32) -> Self {
        let canonical = serde_json::json!({
            "date_t": date_t.to_string(),
            "horizon": horizon,
            "method": method,
            "symbol": symbol,
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        Self(hash.to_hex()[..16].to_string())
    }
}

impl fmt::Display for ForecastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a persisted conformal forecast record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Content-derived record id: (symbol, date_t, method, mode, updated_at).
    ///
    /// A recomputed calibration of the same date gets a new id because its
    /// `updated_at` differs.
    pub fn derive(
        symbol: &str,
        date_t: NaiveDate,
        method: &str,
        mode: &str,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let canonical = serde_json::json!({
            "date_t": date_t.to_string(),
            "method": method,
            "mode": mode,
            "symbol": symbol,
            "updated_at": updated_at.to_rfc3339(),
        });
        let hash = blake3::hash(canonical.to_string().as_bytes());
        Self(hash.to_hex().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn forecast_id_deterministic() {
        let a = ForecastId::derive("SPY", d(2024, 3, 1), "garch11", 1);
        let b = ForecastId::derive("SPY", d(2024, 3, 1), "garch11", 1);
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 16);
    }

    #[test]
    fn forecast_id_differs_by_method() {
        let a = ForecastId::derive("SPY", d(2024, 3, 1), "garch11", 1);
        let b = ForecastId::derive("SPY", d(2024, 3, 1), "gbm", 1);
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_changes_with_updated_at() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 21, 5, 0).unwrap();
        let a = RecordId::derive("SPY", d(2024, 3, 1), "garch11", "CQR", t0);
        let b = RecordId::derive("SPY", d(2024, 3, 1), "garch11", "CQR", t1);
        assert_ne!(a, b);
    }
}
