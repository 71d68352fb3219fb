//! Coverage tracking: issued intervals and their eventual hit/miss outcome.
//!
//! Every calibration records the interval it issued. Later calibrations
//! resolve those intervals once a realized outcome for their date shows up in
//! the window. The issued base forecast is preferred; any other window
//! forecast for the same date carries the same realized close and is used when
//! the window picked a different method for that date.
//!
//! Each interval resolves exactly once: its `outcome` slot is the guard, so
//! intervals may resolve in any date order and a recalibrated day is never
//! counted twice.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{BaseForecast, Domain, ForecastId};
use crate::score::NonconformityScorer;

/// Issued intervals retained per symbol.
pub const TRACKING_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalOutcome {
    Hit,
    Miss,
}

/// A calibrated interval as issued, in domain coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedInterval {
    pub date_t: NaiveDate,
    pub base_id: ForecastId,
    pub lower: f64,
    pub upper: f64,
    #[serde(default)]
    pub outcome: Option<IntervalOutcome>,
}

/// A previously issued interval whose outcome became known in this window.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOutcome {
    pub date_t: NaiveDate,
    pub base_id: ForecastId,
    /// Realized outcome in domain coordinates.
    pub realized: f64,
    pub outcome: IntervalOutcome,
}

impl ResolvedOutcome {
    /// 1.0 for a miss, 0.0 for a hit.
    pub fn miss_indicator(&self) -> f64 {
        match self.outcome {
            IntervalOutcome::Miss => 1.0,
            IntervalOutcome::Hit => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageTracking {
    /// Most recent issued intervals, ascending by date.
    pub issued: Vec<IssuedInterval>,
    /// Lifetime hit count.
    pub hits: u64,
    /// Lifetime miss count.
    pub misses: u64,
    /// Newest date among resolved intervals. Informational only.
    pub last_feedback_date: Option<NaiveDate>,
}

impl CoverageTracking {
    /// Find pending intervals whose outcome is now observable.
    ///
    /// Pure: the tracker is not modified. Results are ascending by date.
    pub fn resolve_pending(
        &self,
        window: &[BaseForecast],
        domain: Domain,
        today: NaiveDate,
    ) -> Vec<ResolvedOutcome> {
        let scorer = NonconformityScorer::coverage(domain);
        let by_id: HashMap<&ForecastId, &BaseForecast> = window.iter().map(|f| (&f.id, f)).collect();
        let by_date: HashMap<NaiveDate, &BaseForecast> = window.iter().map(|f| (f.date_t, f)).collect();

        let mut resolved: Vec<ResolvedOutcome> = self
            .issued
            .iter()
            .filter(|iv| iv.outcome.is_none() && iv.date_t < today)
            .filter_map(|iv| {
                let base = by_id.get(&iv.base_id).or_else(|| by_date.get(&iv.date_t))?;
                let realized = scorer.view(base).ok()?.outcome?;
                let outcome = if realized < iv.lower || realized > iv.upper {
                    IntervalOutcome::Miss
                } else {
                    IntervalOutcome::Hit
                };
                Some(ResolvedOutcome {
                    date_t: iv.date_t,
                    base_id: iv.base_id.clone(),
                    realized,
                    outcome,
                })
            })
            .collect();
        resolved.sort_by_key(|r| r.date_t);
        resolved
    }

    /// Mark resolved intervals and count them. Intervals that are no longer
    /// pending are skipped.
    pub fn apply_resolved(&mut self, resolved: &[ResolvedOutcome]) {
        for r in resolved {
            let Some(iv) = self
                .issued
                .iter_mut()
                .find(|iv| iv.date_t == r.date_t && iv.base_id == r.base_id && iv.outcome.is_none())
            else {
                continue;
            };
            iv.outcome = Some(r.outcome);
            match r.outcome {
                IntervalOutcome::Hit => self.hits += 1,
                IntervalOutcome::Miss => self.misses += 1,
            }
            self.last_feedback_date = self.last_feedback_date.max(Some(r.date_t));
        }
    }

    /// Record a newly issued interval, replacing any earlier issue for the same date.
    pub fn record_issued(&mut self, interval: IssuedInterval) {
        let carried = self
            .issued
            .iter()
            .position(|iv| iv.date_t == interval.date_t)
            .map(|pos| self.issued.remove(pos))
            .and_then(|old| old.outcome);
        self.issued.push(IssuedInterval {
            outcome: interval.outcome.or(carried),
            ..interval
        });
        self.issued.sort_by_key(|iv| iv.date_t);
        if self.issued.len() > TRACKING_CAPACITY {
            let excess = self.issued.len() - TRACKING_CAPACITY;
            self.issued.drain(..excess);
        }
    }

    /// Hit and miss counts over the retained intervals.
    pub fn recent_counts(&self) -> (usize, usize) {
        self.issued.iter().fold((0, 0), |(h, m), iv| match iv.outcome {
            Some(IntervalOutcome::Hit) => (h + 1, m),
            Some(IntervalOutcome::Miss) => (h, m + 1),
            None => (h, m),
        })
    }

    /// Empirical coverage over the retained, resolved intervals.
    pub fn recent_hit_rate(&self) -> Option<f64> {
        let (hits, misses) = self.recent_counts();
        let total = hits + misses;
        (total > 0).then(|| hits as f64 / total as f64)
    }

    pub fn pending(&self) -> usize {
        self.issued.iter().filter(|iv| iv.outcome.is_none()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn base(id: &str, date: NaiveDate, y: Option<f64>) -> BaseForecast {
        BaseForecast {
            id: ForecastId::new(id),
            symbol: "SPY".into(),
            date_t: date,
            method: "gbm".into(),
            domain: Domain::Price,
            horizon: 1,
            coverage: 0.9,
            origin_price: 100.0,
            point_estimate: 100.0,
            lower: 99.0,
            upper: 101.0,
            realized_outcome: y,
            is_final: true,
        }
    }

    fn issued(id: &str, date: NaiveDate) -> IssuedInterval {
        IssuedInterval {
            date_t: date,
            base_id: ForecastId::new(id),
            lower: 98.0,
            upper: 102.0,
            outcome: None,
        }
    }

    #[test]
    fn resolves_miss_and_hit() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        t.record_issued(issued("b", day(4)));
        let window = vec![base("a", day(3), Some(103.0)), base("b", day(4), Some(100.0))];

        let resolved = t.resolve_pending(&window, Domain::Price, day(5));
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].outcome, IntervalOutcome::Miss);
        assert_eq!(resolved[1].outcome, IntervalOutcome::Hit);

        t.apply_resolved(&resolved);
        assert_eq!((t.hits, t.misses), (1, 1));
        assert_eq!(t.last_feedback_date, Some(day(4)));
        assert_eq!(t.pending(), 0);
        assert_eq!(t.recent_hit_rate(), Some(0.5));
    }

    #[test]
    fn unrealized_intervals_stay_pending() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        let window = vec![base("a", day(3), None)];
        assert!(t.resolve_pending(&window, Domain::Price, day(5)).is_empty());
    }

    #[test]
    fn resolution_is_not_repeated() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        let window = vec![base("a", day(3), Some(103.0))];
        let first = t.resolve_pending(&window, Domain::Price, day(4));
        t.apply_resolved(&first);
        t.apply_resolved(&first);
        assert_eq!(t.misses, 1);
        assert!(t.resolve_pending(&window, Domain::Price, day(4)).is_empty());
    }

    #[test]
    fn reissuing_same_date_replaces_entry() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        let mut again = issued("a", day(3));
        again.upper = 105.0;
        t.record_issued(again);
        assert_eq!(t.issued.len(), 1);
        assert_eq!(t.issued[0].upper, 105.0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut t = CoverageTracking::default();
        let start = day(1);
        for i in 0..(TRACKING_CAPACITY as i64 + 5) {
            t.record_issued(issued("x", start + chrono::Duration::days(i)));
        }
        assert_eq!(t.issued.len(), TRACKING_CAPACITY);
        assert_eq!(t.issued[0].date_t, start + chrono::Duration::days(5));
    }

    #[test]
    fn resolves_through_another_method_on_the_same_date() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("garch", day(3)));
        let mut other = base("arima", day(3), Some(103.0));
        other.method = "arima".into();

        let resolved = t.resolve_pending(&[other], Domain::Price, day(4));
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].base_id, ForecastId::new("garch"));
        assert_eq!(resolved[0].outcome, IntervalOutcome::Miss);

        t.apply_resolved(&resolved);
        assert_eq!(t.misses, 1);
        assert_eq!(t.pending(), 0);
    }

    #[test]
    fn late_outcome_resolves_after_newer_one() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        t.record_issued(issued("b", day(4)));

        // Day 4 is realized first; day 3's outcome arrives later.
        let window = vec![base("a", day(3), None), base("b", day(4), Some(100.0))];
        let first = t.resolve_pending(&window, Domain::Price, day(5));
        assert_eq!(first.len(), 1);
        t.apply_resolved(&first);
        assert_eq!(t.last_feedback_date, Some(day(4)));

        let window = vec![base("a", day(3), Some(97.0)), base("b", day(4), Some(100.0))];
        let late = t.resolve_pending(&window, Domain::Price, day(6));
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].date_t, day(3));
        t.apply_resolved(&late);

        assert_eq!((t.hits, t.misses), (1, 1));
        assert_eq!(t.pending(), 0);
        assert_eq!(t.last_feedback_date, Some(day(4)));
    }

    #[test]
    fn reissue_keeps_resolved_outcome() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(3)));
        let window = vec![base("a", day(3), Some(103.0))];
        let resolved = t.resolve_pending(&window, Domain::Price, day(4));
        t.apply_resolved(&resolved);

        t.record_issued(issued("a", day(3)));
        assert!(t.resolve_pending(&window, Domain::Price, day(4)).is_empty());
        assert_eq!(t.misses, 1);
    }

    #[test]
    fn today_is_never_resolved() {
        let mut t = CoverageTracking::default();
        t.record_issued(issued("a", day(5)));
        let window = vec![base("a", day(5), Some(103.0))];
        assert!(t.resolve_pending(&window, Domain::Price, day(5)).is_empty());
    }
}
