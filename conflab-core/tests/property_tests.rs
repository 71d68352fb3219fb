//! Property tests for calibration invariants.
//!
//! Uses proptest to verify:
//! 1. Quantile bounds: any quantile lies within [min, max] and is monotone in level
//! 2. CQR symmetry: delta_L == delta_U for any window
//! 3. Coverage monotonicity: raising coverage never narrows the interval (all modes)
//! 4. ACI feedback: one miss moves theta by exactly eta * (alpha - 1)

use proptest::prelude::*;

use conflab_core::domain::{BaseForecast, Domain};
use conflab_core::modes::aci::update_theta;
use conflab_core::modes::{CalibrationInput, ModeConfig, ModeOutput};
use conflab_core::quantile::quantile;
use conflab_core::test_helpers::{next_forecast, noisy_window, window_with_scores};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_scores() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0..5.0_f64, 1..80)
}

fn arb_mode() -> impl Strategy<Value = ModeConfig> {
    prop_oneof![
        Just(ModeConfig::Cqr),
        (5u32..30, any::<u64>()).prop_map(|(k, seed)| ModeConfig::Enbpi {
            ensemble_size: k,
            seed: Some(seed),
        }),
        (0.001..0.1_f64, -0.05..0.05_f64).prop_map(|(eta, theta)| ModeConfig::Aci {
            eta,
            initial_theta: theta,
            epsilon: 0.001,
        }),
    ]
}

fn run(mode: &ModeConfig, window: &[BaseForecast], coverage: f64) -> ModeOutput {
    let target = next_forecast(window, window.len());
    mode.build(10)
        .unwrap()
        .calibrate(&CalibrationInput {
            window,
            target: &target,
            domain: window[0].domain,
            coverage,
            prior: None,
            feedback: &[],
        })
        .unwrap()
}

// ── 1. Quantile bounds ───────────────────────────────────────────────

proptest! {
    #[test]
    fn quantile_within_sample_range(scores in arb_scores(), level in 0.01..0.99_f64) {
        let q = quantile(&scores, level).unwrap();
        let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(q >= min && q <= max);
    }

    #[test]
    fn quantile_monotone_in_level(scores in arb_scores(), a in 0.01..0.99_f64, b in 0.01..0.99_f64) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(quantile(&scores, lo).unwrap() <= quantile(&scores, hi).unwrap());
    }
}

// ── 2. CQR symmetry ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn cqr_deltas_are_symmetric(scores in prop::collection::vec(0.0..2.0_f64, 10..60), coverage in 0.5..0.99_f64) {
        let window = window_with_scores("SPY", &scores, coverage);
        let out = run(&ModeConfig::Cqr, &window, coverage);
        prop_assert_eq!(out.delta_l, out.delta_u);
        prop_assert!(out.delta_l >= 0.0);
    }
}

// ── 3. Coverage monotonicity ─────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn higher_coverage_never_narrows(
        mode in arb_mode(),
        seed in any::<u64>(),
        n in 20usize..70,
        lo in 0.6..0.85_f64,
        gap in 0.01..0.14_f64,
        log in any::<bool>(),
    ) {
        let domain = if log { Domain::Log } else { Domain::Price };
        let window = noisy_window("SPY", n, seed, domain, 0.9);
        let narrow = run(&mode, &window, lo);
        let wide = run(&mode, &window, lo + gap);
        prop_assert!(
            wide.delta_l + wide.delta_u >= narrow.delta_l + narrow.delta_u - 1e-12,
            "{:?}: coverage {} gave {} but {} gave {}",
            mode, lo, narrow.delta_l + narrow.delta_u, lo + gap, wide.delta_l + wide.delta_u
        );
    }
}

// ── 4. ACI feedback ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn miss_and_hit_differ_by_eta(theta in -0.2..0.2_f64, eta in 0.0001..0.1_f64, alpha in 0.01..0.5_f64) {
        let miss = update_theta(theta, eta, alpha, 1.0);
        let hit = update_theta(theta, eta, alpha, 0.0);
        prop_assert!((miss - (theta + eta * (alpha - 1.0))).abs() < 1e-12);
        prop_assert!((hit - miss - eta).abs() < 1e-12);
    }
}
