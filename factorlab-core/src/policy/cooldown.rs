//! Ratio-vs-MA rotation with a switching cooldown.
//!
//! A full switch needs at least `cooldown` periods since the previous one.
//! A disagreement inside the cooldown is expressed as a blended allocation
//! without changing the regime.

use super::{require_positive, AllocationPolicy, PolicyError, PolicyInput, RegimeWeights};
use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightVector};
use crate::signals::{ratio_trend, SignalFrame};
use serde::{Deserialize, Serialize};

pub const RATIO: &str = "ratio";
pub const RATIO_MA: &str = "ratio_ma";
/// 1.0 when the ratio is above its MA, 0.0 below, NaN during warmup.
pub const RATIO_ABOVE_MA: &str = "ratio_above_ma";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub ma_window: usize,
    /// Minimum periods between full switches.
    pub cooldown: usize,
    pub tilt: f64,
    /// Momentum weight held while a switch is deferred.
    pub blend: f64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            ma_window: 6,
            cooldown: 2,
            tilt: 0.75,
            blend: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CooldownState {
    pub regime: Option<Regime>,
    /// `None` until the first full switch.
    pub periods_since_switch: Option<usize>,
    pub weights: WeightVector,
}

#[derive(Debug, Clone)]
pub struct RatioCooldown {
    config: CooldownConfig,
    weights: RegimeWeights,
    blended: WeightVector,
}

impl RatioCooldown {
    pub fn new(config: CooldownConfig) -> Result<Self, PolicyError> {
        require_positive("ma_window", config.ma_window)?;
        Ok(Self {
            weights: RegimeWeights::symmetric(config.tilt)?,
            blended: WeightVector::momentum_value(config.blend)?,
            config,
        })
    }

    fn cooldown_elapsed(&self, state: &CooldownState) -> bool {
        state
            .periods_since_switch
            .map_or(true, |p| p >= self.config.cooldown)
    }
}

impl AllocationPolicy for RatioCooldown {
    type State = CooldownState;

    fn name(&self) -> &'static str {
        "cooldown"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        let value = prices
            .value()
            .ok_or(PolicyError::MissingValueSeries { policy: "cooldown" })?;
        let trend = ratio_trend(prices.momentum(), value, self.config.ma_window);
        let above = trend
            .ratio
            .iter()
            .zip(&trend.ratio_ma)
            .map(|(r, ma)| {
                if ma.is_nan() {
                    f64::NAN
                } else if r > ma {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();

        let mut frame = SignalFrame::new();
        frame.insert(RATIO, trend.ratio);
        frame.insert(RATIO_MA, trend.ratio_ma);
        frame.insert(RATIO_ABOVE_MA, above);
        Ok(frame)
    }

    fn initial_state(&self) -> CooldownState {
        CooldownState {
            regime: None,
            periods_since_switch: None,
            weights: self.default_weights(),
        }
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut CooldownState) -> Decision {
        state.periods_since_switch = state.periods_since_switch.map(|p| p.saturating_add(1));

        if let Some(above) = input.defined(RATIO_ABOVE_MA) {
            let wanted = if above > 0.5 {
                Regime::Momentum
            } else {
                Regime::Value
            };
            match state.regime {
                // First valid signal seeds the regime; not a switch.
                None => state.regime = Some(wanted),
                Some(current) if current == wanted => {}
                Some(_) if self.cooldown_elapsed(state) => {
                    state.regime = Some(wanted);
                    state.periods_since_switch = Some(0);
                }
                Some(_) => {
                    state.weights = self.blended;
                    return Decision::new(input.date, state.weights, state.regime);
                }
            }
            if let Some(regime) = state.regime {
                state.weights = self.weights.for_regime(regime);
            }
        }
        Decision::new(input.date, state.weights, state.regime)
    }

    fn default_weights(&self) -> WeightVector {
        WeightVector::BALANCED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// Drive the fold directly with a binary signal.
    fn fold(signal: &[f64], cooldown: usize) -> Vec<Decision> {
        let policy = RatioCooldown::new(CooldownConfig {
            cooldown,
            ..CooldownConfig::default()
        })
        .unwrap();
        let mut frame = SignalFrame::new();
        frame.insert(RATIO_ABOVE_MA, signal.to_vec());
        let mut state = policy.initial_state();
        let start = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        (0..signal.len())
            .map(|index| {
                let input = PolicyInput {
                    index,
                    date: start,
                    signals: &frame,
                };
                policy.step(&input, &mut state)
            })
            .collect()
    }

    #[test]
    fn first_signal_seeds_without_switch() {
        let d = fold(&[f64::NAN, 0.0, 0.0], 2);
        assert_eq!(d[0].regime, None);
        assert_eq!(d[0].weights, WeightVector::BALANCED);
        assert_eq!(d[1].regime, Some(Regime::Value));
        assert_eq!(d[1].weights.momentum, 0.25);
    }

    #[test]
    fn deferred_switch_blends() {
        // seed M, switch V (first switch is free), blend, switch M, blend, switch V
        let d = fold(&[1.0, 0.0, 1.0, 1.0, 0.0, 0.0], 2);
        let regimes: Vec<_> = d.iter().map(|x| x.regime.unwrap()).collect();
        assert_eq!(
            regimes,
            vec![
                Regime::Momentum,
                Regime::Value,
                Regime::Value,
                Regime::Momentum,
                Regime::Momentum,
                Regime::Value
            ]
        );
        assert_eq!(d[2].weights, WeightVector::BALANCED);
        assert_eq!(d[4].weights, WeightVector::BALANCED);
        assert_eq!(d[3].weights.momentum, 0.75);
    }

    #[test]
    fn undefined_signal_holds_last_weights() {
        let d = fold(&[1.0, 0.0, 1.0, f64::NAN], 2);
        assert_eq!(d[2].weights, WeightVector::BALANCED);
        assert_eq!(d[3].weights, WeightVector::BALANCED);
        assert_eq!(d[3].regime, Some(Regime::Value));
    }

    #[test]
    fn zero_cooldown_always_switches() {
        let d = fold(&[1.0, 0.0, 1.0, 0.0], 0);
        assert!(d.iter().all(|x| x.weights != WeightVector::BALANCED));
    }

    #[test]
    fn prepare_marks_ratio_above_ma() {
        let prices = crate::signals::make_aligned(&[100.0, 100.0, 130.0, 90.0], &[100.0; 4]);
        let policy = RatioCooldown::new(CooldownConfig {
            ma_window: 2,
            ..CooldownConfig::default()
        })
        .unwrap();
        let frame = policy.prepare(&prices).unwrap();
        let above = frame.column(RATIO_ABOVE_MA).unwrap();
        assert!(above[0].is_nan());
        assert_eq!(&above[1..], &[0.0, 1.0, 0.0]);
    }
}
