//! End-to-end behaviour of individual allocation policies on hand-built
//! price paths: signal, fold, lag and simulation together.

use chrono::{Months, NaiveDate};
use factorlab_core::data::synthetic::month_end;
use factorlab_core::data::AlignedSeries;
use factorlab_core::domain::{Decision, PricePoint, PriceSeries, Regime, WeightVector};
use factorlab_core::engine::{enforce, simulate, SimConfig};
use factorlab_core::policy::risk_score::RETURN_SHORT;
use factorlab_core::policy::{
    build_policy, CooldownConfig, HysteresisConfig, PolicyConfig, RiskScoreConfig,
    ThresholdConfig,
};

fn month_ends(n: usize) -> Vec<NaiveDate> {
    let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
    (0..n)
        .map(|i| month_end(start.checked_add_months(Months::new(i as u32)).unwrap()))
        .collect()
}

fn two_leg(momentum: &[f64], value: &[f64]) -> AlignedSeries {
    AlignedSeries::from_columns(
        month_ends(momentum.len()),
        vec![
            ("MOM".to_string(), momentum.to_vec()),
            ("VAL".to_string(), value.to_vec()),
        ],
    )
    .unwrap()
}

fn compounding(legs: &[(usize, f64)]) -> Vec<f64> {
    let mut closes = vec![100.0];
    for &(months, r) in legs {
        for _ in 0..months {
            let last = *closes.last().unwrap();
            closes.push(last * (1.0 + r));
        }
    }
    closes
}

fn switches(decisions: &[Decision]) -> Vec<usize> {
    decisions
        .windows(2)
        .enumerate()
        .filter_map(|(i, w)| match (w[0].regime, w[1].regime) {
            (Some(a), Some(b)) if a != b => Some(i + 1),
            _ => None,
        })
        .collect()
}

// ── Threshold switch ─────────────────────────────────────────────────

#[test]
fn threshold_switch_takes_effect_the_period_after_the_jump() {
    // Fall into value, six flat months, then a +25% three-month jump at t=9.
    let closes = [100.0, 100.0, 100.0, 75.0, 75.0, 75.0, 75.0, 75.0, 75.0, 93.75, 93.75];
    let prices = two_leg(&closes, &[100.0; 11]);
    let policy = build_policy(&PolicyConfig::Threshold(ThresholdConfig::default())).unwrap();
    let run = policy.run(&prices).unwrap();

    for t in 3..9 {
        assert_eq!(run.decisions[t].regime, Some(Regime::Value), "period {t}");
    }
    assert_eq!(run.decisions[9].regime, Some(Regime::Momentum));

    let effective = enforce(&run.decisions, policy.decision_lag(), policy.initial_weights());
    assert_eq!(effective[9].weights, WeightVector::ALL_VALUE);
    assert_eq!(effective[10].weights, WeightVector::ALL_MOMENTUM);

    // The jump month's momentum return is earned by the value allocation.
    let portfolio = simulate(&prices, &effective, &SimConfig::default(), WeightVector::BALANCED)
        .unwrap();
    assert_eq!(portfolio.periods[9].portfolio_return, Some(0.0));
}

// ── Hysteresis ───────────────────────────────────────────────────────

#[test]
fn hysteresis_ignores_noise_inside_the_dead_zone() {
    let momentum: Vec<f64> = (0..60)
        .map(|t| if t % 2 == 0 { 100.05 } else { 99.95 })
        .collect();
    let prices = two_leg(&momentum, &[100.0; 60]);
    let policy = build_policy(&PolicyConfig::Hysteresis(HysteresisConfig::default())).unwrap();
    let run = policy.run(&prices).unwrap();

    assert!(switches(&run.decisions).is_empty());
    assert!(run
        .decisions
        .iter()
        .all(|d| d.regime == Some(Regime::Neutral) && d.weights == WeightVector::BALANCED));
}

#[test]
fn hysteresis_trend_enters_and_holds() {
    // Momentum pulls ahead steadily, then stalls: the regime should enter
    // momentum once and not leave while the deviation decays toward zero.
    let momentum = compounding(&[(12, 0.0), (12, 0.02), (12, 0.0)]);
    let prices = two_leg(&momentum, &vec![100.0; momentum.len()]);
    let policy = build_policy(&PolicyConfig::Hysteresis(HysteresisConfig::default())).unwrap();
    let run = policy.run(&prices).unwrap();

    let flips = switches(&run.decisions);
    assert_eq!(flips.len(), 1, "switches at {flips:?}");
    assert_eq!(run.decisions[flips[0]].regime, Some(Regime::Momentum));
}

// ── Cooldown ─────────────────────────────────────────────────────────

#[test]
fn cooldown_spaces_switches_and_blends_in_between() {
    // Ratio alternates 1.1 / 0.9, so the above-MA flag flips every period.
    let momentum: Vec<f64> = (0..48)
        .map(|t| if t % 2 == 0 { 110.0 } else { 90.0 })
        .collect();
    let prices = two_leg(&momentum, &[100.0; 48]);
    let cooldown = 2;
    let policy = build_policy(&PolicyConfig::Cooldown(CooldownConfig {
        cooldown,
        ..CooldownConfig::default()
    }))
    .unwrap();
    let run = policy.run(&prices).unwrap();

    let flips = switches(&run.decisions);
    assert!(flips.len() >= 5, "expected repeated switching, got {flips:?}");
    for pair in flips.windows(2) {
        assert!(pair[1] - pair[0] > cooldown, "switches too close: {pair:?}");
    }

    let blended = WeightVector::momentum_value(0.5).unwrap();
    let deferred = run
        .decisions
        .iter()
        .filter(|d| d.weights == blended)
        .count();
    assert!(deferred > 0);
}

#[test]
fn cooldown_weight_trace_on_hand_built_path() {
    // With a 2-period MA the ratio sits above its MA exactly when it rose,
    // so the flag per period is: -, up, down, up, up, up, down, down, up.
    let momentum = [100.0, 110.0, 100.0, 105.0, 108.0, 112.0, 104.0, 100.0, 106.0];
    let prices = two_leg(&momentum, &[100.0; 9]);
    let policy = build_policy(&PolicyConfig::Cooldown(CooldownConfig {
        ma_window: 2,
        cooldown: 2,
        tilt: 0.75,
        blend: 0.5,
    }))
    .unwrap();
    let run = policy.run(&prices).unwrap();

    let tilt_mom = WeightVector::momentum_value(0.75).unwrap();
    let tilt_val = WeightVector::momentum_value(0.25).unwrap();
    let blended = WeightVector::new(0.5, 0.5, 0.0).unwrap();
    let expected = [
        // MA warming up: defaults, no regime.
        (WeightVector::BALANCED, None),
        // First defined signal seeds the regime.
        (tilt_mom, Some(Regime::Momentum)),
        // First switch is never held back.
        (tilt_val, Some(Regime::Value)),
        // One period after a switch: disagreement blends, regime kept.
        (blended, Some(Regime::Value)),
        // Two periods after the switch the cooldown has run out.
        (tilt_mom, Some(Regime::Momentum)),
        // Agreement inside the cooldown keeps the full tilt.
        (tilt_mom, Some(Regime::Momentum)),
        (tilt_val, Some(Regime::Value)),
        (tilt_val, Some(Regime::Value)),
        (tilt_mom, Some(Regime::Momentum)),
    ];
    assert_eq!(run.decisions.len(), expected.len());
    for (t, (decision, (weights, regime))) in run.decisions.iter().zip(&expected).enumerate() {
        assert_eq!(decision.weights, *weights, "weights at {t}");
        assert_eq!(decision.regime, *regime, "regime at {t}");
    }
    assert_eq!(switches(&run.decisions), vec![2, 4, 6, 8]);

    // Each decision is held one period later.
    let effective = enforce(&run.decisions, policy.decision_lag(), policy.initial_weights());
    assert_eq!(effective[0].weights, WeightVector::BALANCED);
    for t in 1..effective.len() {
        assert_eq!(effective[t].weights, run.decisions[t - 1].weights, "held at {t}");
    }
}

// ── Risk score persistence ───────────────────────────────────────────

#[test]
fn risk_score_holds_while_short_return_is_negative() {
    // Calm run-up, a sharp rally, a crash, then a steady recovery.
    let closes = compounding(&[(48, 0.01), (8, 0.09), (6, -0.04), (12, 0.03)]);
    let dates = month_ends(closes.len());
    let points = dates
        .iter()
        .zip(&closes)
        .map(|(&d, &c)| PricePoint::new(d, c))
        .collect();
    let series = PriceSeries::new("MOM", points).unwrap();
    let prices = AlignedSeries::single(&series).unwrap();

    let policy = build_policy(&PolicyConfig::RiskScore(RiskScoreConfig::default())).unwrap();
    let run = policy.run(&prices).unwrap();
    let score: Vec<f64> = run.decisions.iter().map(|d| d.score.unwrap()).collect();
    let short = run.signals.column(RETURN_SHORT).unwrap();

    let crash_start = 57;
    let mut frozen = 0;
    let mut decayed = false;
    for t in crash_start..score.len() {
        if short[t] < 0.0 {
            assert!(score[t] >= score[t - 1], "score fell at {t} with negative short return");
            frozen += 1;
        } else if score[t] < score[t - 1] {
            decayed = true;
        }
    }
    assert!(frozen >= 4, "only {frozen} periods with negative short return");
    assert!(decayed, "score never decayed once the short return recovered");
    assert!(score[crash_start..].iter().any(|&s| s > 0.0));

    // Cash is only ever the complement of momentum.
    for d in &run.decisions {
        assert_eq!(d.weights.value, 0.0);
        assert!(d.weights.momentum >= 0.5 && d.weights.momentum <= 1.0);
    }
}
