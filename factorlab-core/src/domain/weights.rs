//! Allocation weights across the three sleeves and the discrete regimes
//! that map onto them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum allowed deviation of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("{sleeve} weight {value} is outside [0, 1]")]
    OutOfRange { sleeve: &'static str, value: f64 },

    #[error("weights sum to {sum}, expected 1.0")]
    NotNormalized { sum: f64 },
}

/// Fractions of the portfolio held in the Momentum index, the Value index
/// and cash. Each component lies in [0, 1] and the sum is 1 within
/// [`WEIGHT_TOLERANCE`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    pub momentum: f64,
    pub value: f64,
    pub cash: f64,
}

impl WeightVector {
    pub const ALL_MOMENTUM: Self = Self::raw(1.0, 0.0, 0.0);
    pub const ALL_VALUE: Self = Self::raw(0.0, 1.0, 0.0);
    pub const ALL_CASH: Self = Self::raw(0.0, 0.0, 1.0);
    pub const BALANCED: Self = Self::raw(0.5, 0.5, 0.0);

    const fn raw(momentum: f64, value: f64, cash: f64) -> Self {
        Self {
            momentum,
            value,
            cash,
        }
    }

    pub fn new(momentum: f64, value: f64, cash: f64) -> Result<Self, WeightError> {
        let w = Self::raw(momentum, value, cash);
        w.validate()?;
        Ok(w)
    }

    /// Momentum/value split with no cash.
    pub fn momentum_value(momentum: f64) -> Result<Self, WeightError> {
        Self::new(momentum, 1.0 - momentum, 0.0)
    }

    /// Momentum/cash split with no value exposure.
    pub fn momentum_cash(momentum: f64) -> Result<Self, WeightError> {
        Self::new(momentum, 0.0, 1.0 - momentum)
    }

    pub fn sum(&self) -> f64 {
        self.momentum + self.value + self.cash
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        for (sleeve, value) in [
            ("momentum", self.momentum),
            ("value", self.value),
            ("cash", self.cash),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(WeightError::OutOfRange { sleeve, value });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(WeightError::NotNormalized { sum });
        }
        Ok(())
    }

    /// Half the L1 distance between two allocations (one-way turnover).
    pub fn turnover(&self, other: &Self) -> f64 {
        ((self.momentum - other.momentum).abs()
            + (self.value - other.value).abs()
            + (self.cash - other.cash).abs())
            / 2.0
    }

    /// Weighted return given the three sleeve returns.
    pub fn blend(&self, momentum: f64, value: f64, cash: f64) -> f64 {
        // A zero weight never propagates a NaN return from a missing sleeve.
        let term = |w: f64, r: f64| if w == 0.0 { 0.0 } else { w * r };
        term(self.momentum, momentum) + term(self.value, value) + term(self.cash, cash)
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mom={:.2} val={:.2} cash={:.2}",
            self.momentum, self.value, self.cash
        )
    }
}

/// Discrete allocation regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Momentum,
    Value,
    Neutral,
}

impl Regime {
    pub fn label(&self) -> &'static str {
        match self {
            Regime::Momentum => "momentum",
            Regime::Value => "value",
            Regime::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
