//! Relative-strength signals between the momentum and value legs.

use super::rolling::{pct_change, rolling_mean, Window};
use super::{Signal, SignalError};
use crate::data::AlignedSeries;
use serde::{Deserialize, Serialize};

/// Composite weights must sum to 1 within this tolerance.
pub const COMPOSITE_TOLERANCE: f64 = 1e-6;

/// `pct_change(a, n) - pct_change(b, n)`. Positive favours `a`.
pub fn relative_momentum(a: &[f64], b: &[f64], n: usize) -> Vec<f64> {
    pct_change(a, n)
        .into_iter()
        .zip(pct_change(b, n))
        .map(|(ra, rb)| ra - rb)
        .collect()
}

/// One term of a composite signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeLeg {
    pub lookback: usize,
    pub weight: f64,
}

fn check_legs(legs: &[CompositeLeg]) -> Result<(), SignalError> {
    if legs.is_empty() {
        return Err(SignalError::EmptyComposite);
    }
    if let Some(leg) = legs.iter().find(|l| l.lookback == 0) {
        return Err(SignalError::ZeroLookback(leg.lookback));
    }
    let sum: f64 = legs.iter().map(|l| l.weight).sum();
    if (sum - 1.0).abs() > COMPOSITE_TOLERANCE || legs.iter().any(|l| l.weight < 0.0) {
        return Err(SignalError::Weights { sum });
    }
    Ok(())
}

/// Convex combination of relative-momentum signals.
pub fn composite(a: &[f64], b: &[f64], legs: &[CompositeLeg]) -> Result<Vec<f64>, SignalError> {
    check_legs(legs)?;
    let mut out = vec![0.0; a.len()];
    for leg in legs {
        for (o, v) in out.iter_mut().zip(relative_momentum(a, b, leg.lookback)) {
            *o += leg.weight * v;
        }
    }
    Ok(out)
}

/// `a / b`.
pub fn ratio(a: &[f64], b: &[f64]) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| x / y).collect()
}

/// Ratio, its moving average and the fractional deviation from it.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioTrend {
    pub ratio: Vec<f64>,
    pub ratio_ma: Vec<f64>,
    pub deviation: Vec<f64>,
}

pub fn ratio_trend(a: &[f64], b: &[f64], window: usize) -> RatioTrend {
    let ratio = ratio(a, b);
    let ratio_ma = rolling_mean(&ratio, Window::full(window));
    let deviation = ratio
        .iter()
        .zip(&ratio_ma)
        .map(|(r, ma)| (r - ma) / ma)
        .collect();
    RatioTrend {
        ratio,
        ratio_ma,
        deviation,
    }
}

fn nan_column(prices: &AlignedSeries) -> Vec<f64> {
    vec![f64::NAN; prices.len()]
}

/// N-period relative momentum of the momentum leg over the value leg.
#[derive(Debug, Clone)]
pub struct RelativeMomentum {
    lookback: usize,
    name: String,
}

impl RelativeMomentum {
    pub fn new(lookback: usize) -> Result<Self, SignalError> {
        if lookback == 0 {
            return Err(SignalError::ZeroLookback(lookback));
        }
        Ok(Self {
            lookback,
            name: format!("rel_mom_{lookback}"),
        })
    }
}

impl Signal for RelativeMomentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.lookback
    }

    fn compute(&self, prices: &AlignedSeries) -> Vec<f64> {
        match prices.value() {
            Some(value) => relative_momentum(prices.momentum(), value, self.lookback),
            None => nan_column(prices),
        }
    }
}

/// Weighted blend of several relative-momentum lookbacks.
#[derive(Debug, Clone)]
pub struct CompositeMomentum {
    legs: Vec<CompositeLeg>,
    name: String,
}

impl CompositeMomentum {
    pub fn new(legs: Vec<CompositeLeg>) -> Result<Self, SignalError> {
        check_legs(&legs)?;
        let name = legs
            .iter()
            .map(|l| format!("{}x{}", l.weight, l.lookback))
            .collect::<Vec<_>>()
            .join("+");
        Ok(Self {
            legs,
            name: format!("composite_{name}"),
        })
    }
}

impl Signal for CompositeMomentum {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.legs.iter().map(|l| l.lookback).max().unwrap_or(0)
    }

    fn compute(&self, prices: &AlignedSeries) -> Vec<f64> {
        match prices.value() {
            Some(value) => composite(prices.momentum(), value, &self.legs)
                .unwrap_or_else(|_| nan_column(prices)),
            None => nan_column(prices),
        }
    }
}

/// Fractional deviation of the momentum/value ratio from its moving average.
#[derive(Debug, Clone)]
pub struct RatioDeviation {
    window: usize,
    name: String,
}

impl RatioDeviation {
    pub fn new(window: usize) -> Result<Self, SignalError> {
        if window == 0 {
            return Err(SignalError::ZeroLookback(window));
        }
        Ok(Self {
            window,
            name: format!("ratio_dev_{window}"),
        })
    }
}

impl Signal for RatioDeviation {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.window - 1
    }

    fn compute(&self, prices: &AlignedSeries) -> Vec<f64> {
        match prices.value() {
            Some(value) => ratio_trend(prices.momentum(), value, self.window).deviation,
            None => nan_column(prices),
        }
    }
}
