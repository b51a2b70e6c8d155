//! Value only when the momentum leg is falling *and* losing to value.
//!
//! Value is chosen when the momentum leg's N-period return is negative and
//! the momentum/value ratio sits below its moving average; momentum
//! otherwise. Built for weekly data (8-week return, 26-week MA).

use super::{require_positive, AllocationPolicy, PolicyError, PolicyInput, RegimeWeights};
use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightVector};
use crate::signals::rolling::pct_change;
use crate::signals::{ratio_trend, SignalFrame};
use serde::{Deserialize, Serialize};

pub const MOMENTUM_RETURN: &str = "momentum_return";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualConditionConfig {
    pub return_lookback: usize,
    pub ma_window: usize,
    /// Momentum weight in the momentum regime.
    pub momentum_tilt: f64,
    /// Momentum weight in the value regime.
    pub value_tilt: f64,
}

impl Default for DualConditionConfig {
    fn default() -> Self {
        Self {
            return_lookback: 8,
            ma_window: 26,
            momentum_tilt: 0.75,
            value_tilt: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DualCondition {
    config: DualConditionConfig,
    weights: RegimeWeights,
}

impl DualCondition {
    pub fn new(config: DualConditionConfig) -> Result<Self, PolicyError> {
        require_positive("return_lookback", config.return_lookback)?;
        require_positive("ma_window", config.ma_window)?;
        let weights = RegimeWeights {
            momentum: WeightVector::momentum_value(config.momentum_tilt)?,
            value: WeightVector::momentum_value(config.value_tilt)?,
            neutral: WeightVector::BALANCED,
        };
        Ok(Self { config, weights })
    }
}

impl AllocationPolicy for DualCondition {
    type State = Regime;

    fn name(&self) -> &'static str {
        "dual_condition"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        let value = prices
            .value()
            .ok_or(PolicyError::MissingValueSeries { policy: "dual_condition" })?;
        let trend = ratio_trend(prices.momentum(), value, self.config.ma_window);
        let mut frame = SignalFrame::new();
        frame.insert(
            MOMENTUM_RETURN,
            pct_change(prices.momentum(), self.config.return_lookback),
        );
        frame.insert(super::cooldown::RATIO, trend.ratio);
        frame.insert(super::cooldown::RATIO_MA, trend.ratio_ma);
        Ok(frame)
    }

    fn initial_state(&self) -> Regime {
        Regime::Momentum
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut Regime) -> Decision {
        let ret = input.defined(MOMENTUM_RETURN);
        let ratio = input.defined(super::cooldown::RATIO);
        let ma = input.defined(super::cooldown::RATIO_MA);
        if let (Some(ret), Some(ratio), Some(ma)) = (ret, ratio, ma) {
            *state = if ret < 0.0 && ratio < ma {
                Regime::Value
            } else {
                Regime::Momentum
            };
        }
        Decision::new(input.date, self.weights.for_regime(*state), Some(*state))
    }

    fn default_weights(&self) -> WeightVector {
        self.weights.momentum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::run_policy;
    use crate::signals::make_aligned;

    fn policy() -> DualCondition {
        DualCondition::new(DualConditionConfig {
            return_lookback: 1,
            ma_window: 2,
            ..DualConditionConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn value_needs_both_conditions() {
        // t1: mom falls, ratio below MA -> value
        // t2: mom rises -> momentum
        // t3: mom falls but ratio above MA (value fell harder) -> momentum
        let mom = [100.0, 90.0, 95.0, 94.0];
        let val = [100.0, 100.0, 100.0, 80.0];
        let run = run_policy(&policy(), &make_aligned(&mom, &val)).unwrap();
        let r: Vec<_> = run.decisions.iter().map(|d| d.regime.unwrap()).collect();
        assert_eq!(r, vec![Regime::Momentum, Regime::Value, Regime::Momentum, Regime::Momentum]);
        assert_eq!(run.decisions[1].weights, WeightVector::BALANCED);
        assert_eq!(run.decisions[2].weights.momentum, 0.75);
    }

    #[test]
    fn defaults_match_weekly_setup() {
        let c = DualConditionConfig::default();
        assert_eq!((c.return_lookback, c.ma_window), (8, 26));
    }
}
