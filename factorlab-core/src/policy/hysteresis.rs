//! Three-state ratio policy with hysteresis bands.
//!
//! `d = (ratio - MA) / MA`. A held side is only left once `d` crosses the
//! exit band against it; crossing the wider enter band jumps straight to
//! the other side, otherwise the policy rests in neutral. Neutral is left
//! only on a cross of the enter band.

use super::{require_positive, AllocationPolicy, PolicyError, PolicyInput, RegimeWeights};
use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightVector};
use crate::signals::{ratio_trend, SignalFrame};
use serde::{Deserialize, Serialize};

pub const RATIO_DEVIATION: &str = "ratio_deviation";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HysteresisConfig {
    pub ma_window: usize,
    pub enter_band: f64,
    pub exit_band: f64,
    pub tilt: f64,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            ma_window: 6,
            enter_band: 0.003,
            exit_band: 0.001,
            tilt: 0.75,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HysteresisBands {
    config: HysteresisConfig,
    weights: RegimeWeights,
}

impl HysteresisBands {
    pub fn new(config: HysteresisConfig) -> Result<Self, PolicyError> {
        require_positive("ma_window", config.ma_window)?;
        if !(config.exit_band > 0.0 && config.enter_band > config.exit_band) {
            return Err(PolicyError::InvalidBands {
                enter: config.enter_band,
                exit: config.exit_band,
            });
        }
        Ok(Self {
            weights: RegimeWeights::symmetric(config.tilt)?,
            config,
        })
    }

    /// One transition of the band state machine.
    pub fn transition(&self, state: Regime, d: f64) -> Regime {
        let enter = self.config.enter_band;
        let exit = self.config.exit_band;
        match state {
            Regime::Momentum if d < -exit => {
                if d < -enter {
                    Regime::Value
                } else {
                    Regime::Neutral
                }
            }
            Regime::Value if d > exit => {
                if d > enter {
                    Regime::Momentum
                } else {
                    Regime::Neutral
                }
            }
            Regime::Neutral if d > enter => Regime::Momentum,
            Regime::Neutral if d < -enter => Regime::Value,
            held => held,
        }
    }
}

impl AllocationPolicy for HysteresisBands {
    type State = Regime;

    fn name(&self) -> &'static str {
        "hysteresis"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        let value = prices
            .value()
            .ok_or(PolicyError::MissingValueSeries { policy: "hysteresis" })?;
        let trend = ratio_trend(prices.momentum(), value, self.config.ma_window);
        let mut frame = SignalFrame::new();
        frame.insert(super::cooldown::RATIO, trend.ratio);
        frame.insert(super::cooldown::RATIO_MA, trend.ratio_ma);
        frame.insert(RATIO_DEVIATION, trend.deviation);
        Ok(frame)
    }

    fn initial_state(&self) -> Regime {
        Regime::Neutral
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut Regime) -> Decision {
        if let Some(d) = input.defined(RATIO_DEVIATION) {
            *state = self.transition(*state, d);
        }
        Decision::new(input.date, self.weights.for_regime(*state), Some(*state))
    }

    fn default_weights(&self) -> WeightVector {
        WeightVector::BALANCED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> HysteresisBands {
        HysteresisBands::new(HysteresisConfig::default()).unwrap()
    }

    #[test]
    fn neutral_needs_strong_cross() {
        let p = policy();
        assert_eq!(p.transition(Regime::Neutral, 0.002), Regime::Neutral);
        assert_eq!(p.transition(Regime::Neutral, -0.002), Regime::Neutral);
        assert_eq!(p.transition(Regime::Neutral, 0.004), Regime::Momentum);
        assert_eq!(p.transition(Regime::Neutral, -0.004), Regime::Value);
    }

    #[test]
    fn weak_exit_goes_neutral_strong_exit_flips() {
        let p = policy();
        assert_eq!(p.transition(Regime::Momentum, -0.0005), Regime::Momentum);
        assert_eq!(p.transition(Regime::Momentum, -0.002), Regime::Neutral);
        assert_eq!(p.transition(Regime::Momentum, -0.004), Regime::Value);
        assert_eq!(p.transition(Regime::Value, 0.0005), Regime::Value);
        assert_eq!(p.transition(Regime::Value, 0.002), Regime::Neutral);
        assert_eq!(p.transition(Regime::Value, 0.004), Regime::Momentum);
    }

    #[test]
    fn held_side_survives_favourable_moves() {
        let p = policy();
        assert_eq!(p.transition(Regime::Momentum, 0.05), Regime::Momentum);
        assert_eq!(p.transition(Regime::Value, -0.05), Regime::Value);
    }

    #[test]
    fn bands_must_be_ordered() {
        for (enter, exit) in [(0.001, 0.003), (0.002, 0.002), (0.003, 0.0), (0.003, -0.001)] {
            let cfg = HysteresisConfig {
                enter_band: enter,
                exit_band: exit,
                ..HysteresisConfig::default()
            };
            assert!(matches!(
                HysteresisBands::new(cfg),
                Err(PolicyError::InvalidBands { .. })
            ));
        }
    }

    #[test]
    fn warmup_stays_neutral() {
        let prices = crate::signals::make_aligned(&[100.0, 120.0, 150.0], &[100.0; 3]);
        let run = crate::policy::run_policy(&policy(), &prices).unwrap();
        // MA(6) never fills on three rows.
        assert!(run
            .decisions
            .iter()
            .all(|d| d.regime == Some(Regime::Neutral) && d.weights == WeightVector::BALANCED));
    }
}
