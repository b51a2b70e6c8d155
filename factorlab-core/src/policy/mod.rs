//! Allocation policies.
//!
//! A policy is a left-to-right fold over periods:
//! `(state[t-1], signals[t]) -> (state[t], decision[t])`. Signals are
//! precomputed once by [`AllocationPolicy::prepare`]; `step` only sees the
//! signal frame and the period index, never prices or later periods.
//!
//! Decisions are *intentions*. The [`crate::engine::lag`] enforcer turns
//! them into the weights that actually earn each period's return.

pub mod cooldown;
pub mod dual_condition;
pub mod hysteresis;
pub mod quarterly;
pub mod risk_score;
pub mod threshold;
pub mod trend_filter;

pub use cooldown::{CooldownConfig, RatioCooldown};
pub use dual_condition::{DualCondition, DualConditionConfig};
pub use hysteresis::{HysteresisBands, HysteresisConfig};
pub use quarterly::{QuarterlyConfig, QuarterlyRotation};
pub use risk_score::{RiskBreakdown, RiskScoreCash, RiskScoreConfig};
pub use threshold::{ThresholdConfig, ThresholdSwitch};
pub use trend_filter::{apply_trend_filter, TrendFilter, TrendFilterConfig};

use crate::data::AlignedSeries;
use crate::domain::{Decision, Regime, WeightError, WeightVector};
use crate::engine::lag::Lag;
use crate::signals::{SignalError, SignalFrame};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("enter band {enter} must exceed exit band {exit}, both positive")]
    InvalidBands { enter: f64, exit: f64 },

    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("policy '{policy}' needs a value series")]
    MissingValueSeries { policy: &'static str },

    #[error(transparent)]
    Signal(#[from] SignalError),

    #[error(transparent)]
    Weights(#[from] WeightError),
}

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> PolicyError {
    PolicyError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

pub(crate) fn require_positive(name: &'static str, value: usize) -> Result<(), PolicyError> {
    if value == 0 {
        return Err(invalid(name, "must be at least 1"));
    }
    Ok(())
}

// ─── Contract ────────────────────────────────────────────────────────

/// What a policy sees at period `index`.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub index: usize,
    pub date: NaiveDate,
    pub signals: &'a SignalFrame,
}

impl PolicyInput<'_> {
    /// Defined (non-NaN) signal value at this period.
    pub fn defined(&self, name: &str) -> Option<f64> {
        self.signals.defined(name, self.index)
    }

    /// Defined signal value at the previous period.
    pub fn previous(&self, name: &str) -> Option<f64> {
        self.index
            .checked_sub(1)
            .and_then(|i| self.signals.defined(name, i))
    }
}

/// Shared contract for every allocation policy.
pub trait AllocationPolicy: Send + Sync {
    /// Memory carried from one period to the next.
    type State: Clone + std::fmt::Debug + Send;

    fn name(&self) -> &'static str;

    /// Compute every signal column the policy reads.
    fn prepare(&self, prices: &AlignedSeries) -> Result<SignalFrame, PolicyError>;

    fn initial_state(&self) -> Self::State;

    fn step(&self, input: &PolicyInput<'_>, state: &mut Self::State) -> Decision;

    /// Effective weights before the first decision takes effect.
    fn default_weights(&self) -> WeightVector;

    fn lag(&self) -> Lag {
        Lag::Period
    }
}

/// Decisions of one policy over one price history.
#[derive(Debug, Clone)]
pub struct PolicyRun {
    pub decisions: Vec<Decision>,
    pub signals: SignalFrame,
}

/// Fold a policy over every period of `prices`.
pub fn run_policy<P>(policy: &P, prices: &AlignedSeries) -> Result<PolicyRun, PolicyError>
where
    P: AllocationPolicy + ?Sized,
{
    let signals = policy.prepare(prices)?;
    let mut state = policy.initial_state();
    let decisions: Vec<Decision> = prices
        .dates()
        .iter()
        .enumerate()
        .map(|(index, &date)| {
            let input = PolicyInput {
                index,
                date,
                signals: &signals,
            };
            policy.step(&input, &mut state)
        })
        .collect();

    tracing::debug!(
        policy = policy.name(),
        periods = decisions.len(),
        final_state = ?state,
        "policy fold complete"
    );
    Ok(PolicyRun { decisions, signals })
}

/// Object-safe view of an [`AllocationPolicy`], so drivers can hold any
/// policy behind one box.
pub trait PolicyRunner: Send + Sync {
    fn policy_name(&self) -> &'static str;
    fn run(&self, prices: &AlignedSeries) -> Result<PolicyRun, PolicyError>;
    fn initial_weights(&self) -> WeightVector;
    fn decision_lag(&self) -> Lag;
}

impl<P: AllocationPolicy> PolicyRunner for P {
    fn policy_name(&self) -> &'static str {
        self.name()
    }

    fn run(&self, prices: &AlignedSeries) -> Result<PolicyRun, PolicyError> {
        run_policy(self, prices)
    }

    fn initial_weights(&self) -> WeightVector {
        self.default_weights()
    }

    fn decision_lag(&self) -> Lag {
        self.lag()
    }
}

pub type DynPolicy = Box<dyn PolicyRunner>;

// ─── Regime weights ──────────────────────────────────────────────────

/// Weight vector held in each discrete regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeWeights {
    pub momentum: WeightVector,
    pub value: WeightVector,
    pub neutral: WeightVector,
}

impl RegimeWeights {
    /// `tilt` to the favoured leg, the rest to the other; neutral is 50/50.
    pub fn symmetric(tilt: f64) -> Result<Self, PolicyError> {
        Ok(Self {
            momentum: WeightVector::momentum_value(tilt)?,
            value: WeightVector::momentum_value(1.0 - tilt)?,
            neutral: WeightVector::BALANCED,
        })
    }

    pub fn for_regime(&self, regime: Regime) -> WeightVector {
        match regime {
            Regime::Momentum => self.momentum,
            Regime::Value => self.value,
            Regime::Neutral => self.neutral,
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────────

/// Which policy to run, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyConfig {
    Threshold(ThresholdConfig),
    Quarterly(QuarterlyConfig),
    Cooldown(CooldownConfig),
    Hysteresis(HysteresisConfig),
    RiskScore(RiskScoreConfig),
    DualCondition(DualConditionConfig),
}

impl PolicyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            PolicyConfig::Threshold(_) => "threshold",
            PolicyConfig::Quarterly(_) => "quarterly",
            PolicyConfig::Cooldown(_) => "cooldown",
            PolicyConfig::Hysteresis(_) => "hysteresis",
            PolicyConfig::RiskScore(_) => "risk_score",
            PolicyConfig::DualCondition(_) => "dual_condition",
        }
    }

    /// Whether the policy allocates between momentum and cash only.
    pub fn is_momentum_only(&self) -> bool {
        matches!(self, PolicyConfig::RiskScore(_))
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig::Hysteresis(HysteresisConfig::default())
    }
}

/// Validate a config and build the matching policy.
pub fn build_policy(config: &PolicyConfig) -> Result<DynPolicy, PolicyError> {
    let policy: DynPolicy = match config {
        PolicyConfig::Threshold(c) => Box::new(ThresholdSwitch::new(c.clone())?),
        PolicyConfig::Quarterly(c) => Box::new(QuarterlyRotation::new(c.clone())?),
        PolicyConfig::Cooldown(c) => Box::new(RatioCooldown::new(c.clone())?),
        PolicyConfig::Hysteresis(c) => Box::new(HysteresisBands::new(c.clone())?),
        PolicyConfig::RiskScore(c) => Box::new(RiskScoreCash::new(c.clone())?),
        PolicyConfig::DualCondition(c) => Box::new(DualCondition::new(c.clone())?),
    };
    Ok(policy)
}
