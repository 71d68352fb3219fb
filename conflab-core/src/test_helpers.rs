//! Builders for synthetic base forecasts, shared by unit tests, integration
//! tests and benchmarks.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;

use crate::domain::{BaseForecast, Domain, ForecastId};
use crate::rng::rng_for;

pub const TEST_METHOD: &str = "garch11";

/// The `n`-th weekday on or after 2024-01-02.
pub fn trading_day(n: usize) -> NaiveDate {
    let mut date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let mut remaining = n;
    while remaining > 0 {
        date += Duration::days(1);
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            remaining -= 1;
        }
    }
    date
}

/// A price-domain, horizon-1 forecast with `origin_price == point`.
pub fn price_forecast(
    symbol: &str,
    date_t: NaiveDate,
    point: f64,
    lower: f64,
    upper: f64,
    realized: Option<f64>,
    coverage: f64,
) -> BaseForecast {
    BaseForecast {
        id: ForecastId::derive(symbol, date_t, TEST_METHOD, 1),
        symbol: symbol.to_string(),
        date_t,
        method: TEST_METHOD.to_string(),
        domain: Domain::Price,
        horizon: 1,
        coverage,
        origin_price: point,
        point_estimate: point,
        lower,
        upper,
        realized_outcome: realized,
        is_final: true,
    }
}

/// Realized price-domain window whose coverage scores equal `scores`
/// (up to float rounding): the base interval is `[98, 102]` and each outcome
/// lands `score` above the upper bound.
pub fn window_with_scores(symbol: &str, scores: &[f64], coverage: f64) -> Vec<BaseForecast> {
    scores
        .iter()
        .enumerate()
        .map(|(i, s)| price_forecast(symbol, trading_day(i), 100.0, 98.0, 102.0, Some(102.0 + s), coverage))
        .collect()
}

/// Deterministic noisy window of `n` realized forecasts in `domain`.
///
/// Prices follow a seeded random walk; each base interval is +/- 1.5% around
/// the origin, narrower than the simulated moves so calibration has work to do.
pub fn noisy_window(symbol: &str, n: usize, seed: u64, domain: Domain, coverage: f64) -> Vec<BaseForecast> {
    let mut rng = rng_for(seed);
    let mut price = 100.0_f64;
    (0..n)
        .map(|i| {
            let date_t = trading_day(i);
            let drift: f64 = rng.gen_range(-0.0005..0.0005);
            let shock: f64 = rng.gen_range(-0.025..0.025);
            let realized = price * (drift + shock).exp();
            let f = BaseForecast {
                id: ForecastId::derive(symbol, date_t, TEST_METHOD, 1),
                symbol: symbol.to_string(),
                date_t,
                method: TEST_METHOD.to_string(),
                domain,
                horizon: 1,
                coverage,
                origin_price: price,
                point_estimate: price * (1.0 + drift),
                lower: price * 0.985,
                upper: price * 1.015,
                realized_outcome: Some(realized),
                is_final: true,
            };
            price = realized;
            f
        })
        .collect()
}

/// Today's unrealized forecast following `window`.
pub fn next_forecast(window: &[BaseForecast], day_index: usize) -> BaseForecast {
    let last = window.last().expect("window must not be empty");
    let origin = last.realized_outcome.unwrap_or(last.origin_price);
    let date_t = trading_day(day_index);
    BaseForecast {
        id: ForecastId::derive(&last.symbol, date_t, &last.method, last.horizon),
        symbol: last.symbol.clone(),
        date_t,
        method: last.method.clone(),
        domain: last.domain,
        horizon: last.horizon,
        coverage: last.coverage,
        origin_price: origin,
        point_estimate: origin,
        lower: origin * 0.985,
        upper: origin * 1.015,
        realized_outcome: None,
        is_final: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trading_days_skip_weekends() {
        // 2024-01-05 is a Friday; the next trading day is Monday 2024-01-08.
        assert_eq!(trading_day(3), NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(trading_day(4), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn noisy_window_is_deterministic() {
        let a = noisy_window("SPY", 30, 7, Domain::Log, 0.9);
        let b = noisy_window("SPY", 30, 7, Domain::Log, 0.9);
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].date_t < w[1].date_t));
    }
}
