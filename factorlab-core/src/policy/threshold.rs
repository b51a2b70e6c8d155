//! Binary momentum/value switch on the momentum leg's own return.
//!
//! The N-period return (in percent) moves the regime to momentum at or
//! above `gain_threshold` and to value at or below `loss_threshold`.
//! Between the two the previous regime holds.

use super::{require_positive, AllocationPolicy, PolicyError, PolicyInput};
use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightVector};
use crate::signals::rolling::pct_change;
use crate::signals::SignalFrame;
use serde::{Deserialize, Serialize};

pub const RETURN_PCT: &str = "momentum_return_pct";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Return lookback in periods.
    pub lookback: usize,
    /// Percent return that switches into momentum.
    pub gain_threshold: f64,
    /// Percent return that switches into value.
    pub loss_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            lookback: 3,
            gain_threshold: 20.0,
            loss_threshold: -20.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdSwitch {
    config: ThresholdConfig,
}

impl ThresholdSwitch {
    pub fn new(config: ThresholdConfig) -> Result<Self, PolicyError> {
        require_positive("lookback", config.lookback)?;
        if config.gain_threshold <= config.loss_threshold {
            return Err(super::invalid(
                "gain_threshold",
                format!(
                    "{} must exceed loss_threshold {}",
                    config.gain_threshold, config.loss_threshold
                ),
            ));
        }
        Ok(Self { config })
    }

    fn weights(regime: Regime) -> WeightVector {
        match regime {
            Regime::Value => WeightVector::ALL_VALUE,
            _ => WeightVector::ALL_MOMENTUM,
        }
    }
}

impl AllocationPolicy for ThresholdSwitch {
    type State = Regime;

    fn name(&self) -> &'static str {
        "threshold"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        let mut frame = SignalFrame::new();
        let pct = pct_change(prices.momentum(), self.config.lookback)
            .into_iter()
            .map(|r| r * 100.0)
            .collect();
        frame.insert(RETURN_PCT, pct);
        Ok(frame)
    }

    fn initial_state(&self) -> Regime {
        Regime::Momentum
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut Regime) -> Decision {
        if let Some(r) = input.defined(RETURN_PCT) {
            if r >= self.config.gain_threshold {
                *state = Regime::Momentum;
            } else if r <= self.config.loss_threshold {
                *state = Regime::Value;
            }
        }
        Decision::new(input.date, Self::weights(*state), Some(*state))
    }

    fn default_weights(&self) -> WeightVector {
        WeightVector::ALL_MOMENTUM
    }
}
