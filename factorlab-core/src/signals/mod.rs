//! Signal engine.
//!
//! Signals are pure functions of aligned prices: a column of `f64` the same
//! length as the date axis, `f64::NAN` while undefined. They are computed
//! once before the allocation fold and read by index inside it.
//!
//! # Look-ahead contamination guard
//! No signal value at period t may depend on prices from period t+1 or
//! later. Every signal must pass the truncated-vs-full series test.

pub mod relative;
pub mod rolling;

pub use relative::{
    composite, ratio, ratio_trend, relative_momentum, CompositeLeg, CompositeMomentum,
    RatioDeviation, RatioTrend, RelativeMomentum,
};
pub use rolling::Window;

use crate::data::AlignedSeries;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("composite weights must sum to 1.0 and be non-negative, got sum {sum}")]
    Weights { sum: f64 },

    #[error("composite signal needs at least one leg")]
    EmptyComposite,

    #[error("lookback must be positive, got {0}")]
    ZeroLookback(usize),
}

/// A relative-strength signal over aligned prices.
pub trait Signal: Send + Sync {
    /// Human-readable name (e.g., "rel_mom_6").
    fn name(&self) -> &str;

    /// Number of periods before the signal can be defined.
    fn lookback(&self) -> usize;

    /// Compute the signal for every date of `prices`.
    fn compute(&self, prices: &AlignedSeries) -> Vec<f64>;
}

/// Serializable description of a relative signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSpec {
    RelativeMomentum { lookback: usize },
    Composite { legs: Vec<CompositeLeg> },
    RatioDeviation { window: usize },
}

impl SignalSpec {
    pub fn build(&self) -> Result<Box<dyn Signal>, SignalError> {
        let signal: Box<dyn Signal> = match self {
            SignalSpec::RelativeMomentum { lookback } => Box::new(RelativeMomentum::new(*lookback)?),
            SignalSpec::Composite { legs } => Box::new(CompositeMomentum::new(legs.clone())?),
            SignalSpec::RatioDeviation { window } => Box::new(RatioDeviation::new(*window)?),
        };
        Ok(signal)
    }
}

impl Default for SignalSpec {
    fn default() -> Self {
        SignalSpec::RelativeMomentum { lookback: 6 }
    }
}

/// Precomputed signal columns, queried by period index during the fold.
#[derive(Debug, Clone, Default)]
pub struct SignalFrame {
    columns: HashMap<String, Vec<f64>>,
}

impl SignalFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    /// Raw value at `index`, NaN included.
    pub fn get(&self, name: &str, index: usize) -> Option<f64> {
        self.columns.get(name).and_then(|v| v.get(index).copied())
    }

    /// Value at `index` if it is defined (present and not NaN).
    pub fn defined(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name, index).filter(|v| !v.is_nan())
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// Column names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Build a two-column aligned series on consecutive month ends.
#[cfg(test)]
pub fn make_aligned(momentum: &[f64], value: &[f64]) -> AlignedSeries {
    let start = chrono::NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
    let mut dates = Vec::with_capacity(momentum.len());
    let mut d = crate::data::synthetic::month_end(start);
    for _ in 0..momentum.len() {
        dates.push(d);
        d = crate::data::synthetic::month_end(d.succ_opt().unwrap());
    }
    AlignedSeries::from_columns(
        dates,
        vec![
            ("MOM".to_string(), momentum.to_vec()),
            ("VAL".to_string(), value.to_vec()),
        ],
    )
    .unwrap()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Assert the first `n` values are NaN and the next one is not.
#[cfg(test)]
pub fn assert_nan_prefix(values: &[f64], n: usize) {
    for (i, v) in values.iter().take(n).enumerate() {
        assert!(v.is_nan(), "expected NaN at {i}, got {v}");
    }
    if let Some(v) = values.get(n) {
        assert!(!v.is_nan(), "expected a value at {n}");
    }
}

/// Default epsilon for signal tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
