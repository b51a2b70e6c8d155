//! Quarterly rotation on a relative-momentum signal.
//!
//! The signal is evaluated every period and the regime follows its sign.
//! The policy declares a quarterly lag, so only the regime standing at the
//! last period of a quarter is ever held, and it is held for the whole of
//! the following quarter.

use super::{AllocationPolicy, PolicyError, PolicyInput, RegimeWeights};
use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightVector};
use crate::engine::lag::Lag;
use crate::signals::{SignalFrame, SignalSpec};
use serde::{Deserialize, Serialize};

pub const SIGNAL: &str = "rotation_signal";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarterlyConfig {
    pub signal: SignalSpec,
    /// Weight on the favoured leg; 1.0 gives a binary rotation.
    pub tilt: f64,
}

impl Default for QuarterlyConfig {
    fn default() -> Self {
        Self {
            signal: SignalSpec::default(),
            tilt: 0.75,
        }
    }
}

pub struct QuarterlyRotation {
    signal: Box<dyn crate::signals::Signal>,
    weights: RegimeWeights,
}

impl std::fmt::Debug for QuarterlyRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuarterlyRotation")
            .field("signal", &self.signal.name())
            .field("weights", &self.weights)
            .finish()
    }
}

impl QuarterlyRotation {
    pub fn new(config: QuarterlyConfig) -> Result<Self, PolicyError> {
        Ok(Self {
            signal: config.signal.build()?,
            weights: RegimeWeights::symmetric(config.tilt)?,
        })
    }
}

impl AllocationPolicy for QuarterlyRotation {
    type State = Option<Regime>;

    fn name(&self) -> &'static str {
        "quarterly"
    }

    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError> {
        if prices.value().is_none() {
            return Err(PolicyError::MissingValueSeries { policy: "quarterly" });
        }
        let mut frame = SignalFrame::new();
        frame.insert(SIGNAL, self.signal.compute(prices));
        Ok(frame)
    }

    fn initial_state(&self) -> Option<Regime> {
        None
    }

    fn step(&self, input: &PolicyInput<'_>, state: &mut Option<Regime>) -> Decision {
        if let Some(s) = input.defined(SIGNAL) {
            *state = Some(if s > 0.0 {
                Regime::Momentum
            } else {
                Regime::Value
            });
        }
        match state {
            Some(regime) => {
                Decision::new(input.date, self.weights.for_regime(*regime), Some(*regime))
            }
            None => Decision::new(input.date, self.default_weights(), None),
        }
    }

    fn default_weights(&self) -> WeightVector {
        self.weights.value
    }

    fn lag(&self) -> Lag {
        Lag::Quarter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lag::enforce;
    use crate::policy::run_policy;
    use crate::signals::make_aligned;

    fn config(tilt: f64) -> QuarterlyConfig {
        QuarterlyConfig {
            signal: SignalSpec::RelativeMomentum { lookback: 1 },
            tilt,
        }
    }

    #[test]
    fn regime_follows_signal_sign() {
        // make_aligned starts at 2015-01-31.
        let mom = [100.0, 110.0, 105.0, 104.0];
        let val = [100.0, 100.0, 100.0, 100.0];
        let policy = QuarterlyRotation::new(config(1.0)).unwrap();
        let run = run_policy(&policy, &make_aligned(&mom, &val)).unwrap();
        let regimes: Vec<_> = run.decisions.iter().map(|d| d.regime).collect();
        assert_eq!(
            regimes,
            vec![None, Some(Regime::Momentum), Some(Regime::Value), Some(Regime::Value)]
        );
        assert_eq!(run.decisions[0].weights, WeightVector::ALL_VALUE);
    }

    #[test]
    fn effective_weights_are_constant_within_a_quarter() {
        // Jan..Dec 2015; momentum leads in Q1, value leads from April.
        let mom = [
            100.0, 110.0, 120.0, 110.0, 100.0, 95.0, 90.0, 85.0, 80.0, 85.0, 90.0, 95.0,
        ];
        let val = [100.0; 12];
        let policy = QuarterlyRotation::new(config(0.75)).unwrap();
        let prices = make_aligned(&mom, &val);
        let run = run_policy(&policy, &prices).unwrap();
        let effective = enforce(&run.decisions, policy.lag(), policy.default_weights());

        // Q1 has no prior quarter: default (value side).
        for e in &effective[0..3] {
            assert_eq!(e.weights.momentum, 0.25);
        }
        // Q2 holds the regime standing at end of March (momentum, +9.1% in March).
        for e in &effective[3..6] {
            assert_eq!(e.weights.momentum, 0.75);
            assert_eq!(e.regime, Some(Regime::Momentum));
        }
        // Q3 holds the June regime (value), Q4 the September regime (value).
        for e in &effective[6..12] {
            assert_eq!(e.weights.momentum, 0.25);
        }
    }

    #[test]
    fn requires_value_series() {
        let prices = make_aligned(&[1.0, 2.0], &[1.0, 2.0]);
        let single = crate::data::AlignedSeries::from_columns(
            prices.dates().to_vec(),
            vec![("MOM".into(), vec![1.0, 2.0])],
        )
        .unwrap();
        let policy = QuarterlyRotation::new(QuarterlyConfig::default()).unwrap();
        assert!(matches!(
            run_policy(&policy, &single),
            Err(PolicyError::MissingValueSeries { .. })
        ));
    }
}
