//! Per-period policy output.

use super::weights::{Regime, WeightVector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Score bins used to label continuous risk-score allocations.
const TIER_BOUNDS: [(f64, &str); 4] = [
    (10.0, "fully_invested"),
    (30.0, "low_risk"),
    (60.0, "elevated_risk"),
    (100.0, "high_risk"),
];

/// What a policy wants to hold from the next period onwards.
///
/// Discrete policies set `regime`; the continuous risk-score policy sets
/// `score` instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub date: NaiveDate,
    pub weights: WeightVector,
    pub regime: Option<Regime>,
    pub score: Option<f64>,
}

impl Decision {
    pub fn new(date: NaiveDate, weights: WeightVector, regime: Option<Regime>) -> Self {
        Self {
            date,
            weights,
            regime,
            score: None,
        }
    }

    pub fn scored(date: NaiveDate, weights: WeightVector, score: f64) -> Self {
        Self {
            date,
            weights,
            regime: None,
            score: Some(score),
        }
    }

    /// Discrete label used for switch counts and time-in-regime shares:
    /// the regime name, or the risk tier for scored decisions.
    pub fn label(&self) -> Option<&'static str> {
        self.regime
            .map(|r| r.label())
            .or_else(|| self.score.map(risk_tier))
    }
}

/// Allocation tier for a risk score in [0, 100].
pub fn risk_tier(score: f64) -> &'static str {
    TIER_BOUNDS
        .iter()
        .find(|(upper, _)| score <= *upper)
        .map(|(_, label)| *label)
        .unwrap_or("high_risk")
}
