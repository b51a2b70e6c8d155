//! Extended internal rate of return for dated cash flows.
//!
//! Solved with Newton-Raphson on the NPV using the analytic derivative.
//! Time is measured in days from the first flow over a 365-day year.

use factorlab_core::domain::CashFlow;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GUESS: f64 = 0.10;
pub const MAX_ITERATIONS: usize = 100;
pub const TOLERANCE: f64 = 1e-10;

const DAYS_PER_YEAR: f64 = 365.0;

/// Result of an XIRR solve. `rate` is a fraction (0.10 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum XirrOutcome {
    Converged { rate: f64, iterations: usize },
    DidNotConverge,
}

impl XirrOutcome {
    pub fn rate(&self) -> Option<f64> {
        match self {
            XirrOutcome::Converged { rate, .. } => Some(*rate),
            XirrOutcome::DidNotConverge => None,
        }
    }

    /// The rate, or 0.0 when the solver failed.
    pub fn rate_or_zero(&self) -> f64 {
        self.rate().unwrap_or(0.0)
    }

    /// The rate in percent, or 0.0 when the solver failed.
    pub fn percent_or_zero(&self) -> f64 {
        self.rate_or_zero() * 100.0
    }

    pub fn converged(&self) -> bool {
        matches!(self, XirrOutcome::Converged { .. })
    }
}

fn year_fractions(flows: &[CashFlow]) -> Vec<f64> {
    let Some(first) = flows.first() else {
        return Vec::new();
    };
    flows
        .iter()
        .map(|f| (f.date - first.date).num_days() as f64 / DAYS_PER_YEAR)
        .collect()
}

/// Net present value of `flows` discounted at `rate` to the first flow date.
pub fn xnpv(rate: f64, flows: &[CashFlow]) -> f64 {
    flows
        .iter()
        .zip(year_fractions(flows))
        .map(|(f, t)| f.amount / (1.0 + rate).powf(t))
        .sum()
}

fn xnpv_derivative(rate: f64, flows: &[CashFlow], years: &[f64]) -> f64 {
    flows
        .iter()
        .zip(years)
        .map(|(f, &t)| -t * f.amount / (1.0 + rate).powf(t + 1.0))
        .sum()
}

pub fn xirr(flows: &[CashFlow]) -> XirrOutcome {
    xirr_with(flows, DEFAULT_GUESS, MAX_ITERATIONS, TOLERANCE)
}

/// Newton-Raphson from `guess`, stopping when a step is smaller than
/// `tolerance`.
pub fn xirr_with(
    flows: &[CashFlow],
    guess: f64,
    max_iterations: usize,
    tolerance: f64,
) -> XirrOutcome {
    let has_outflow = flows.iter().any(|f| f.amount < 0.0);
    let has_inflow = flows.iter().any(|f| f.amount > 0.0);
    if !has_outflow || !has_inflow {
        return XirrOutcome::DidNotConverge;
    }

    let years = year_fractions(flows);
    let mut rate = guess;
    for iteration in 1..=max_iterations {
        let value: f64 = flows
            .iter()
            .zip(&years)
            .map(|(f, &t)| f.amount / (1.0 + rate).powf(t))
            .sum();
        let slope = xnpv_derivative(rate, flows, &years);
        if !value.is_finite() || !slope.is_finite() || slope == 0.0 {
            return XirrOutcome::DidNotConverge;
        }

        let next = rate - value / slope;
        if !next.is_finite() || next <= -1.0 {
            return XirrOutcome::DidNotConverge;
        }
        if (next - rate).abs() < tolerance {
            return XirrOutcome::Converged {
                rate: next,
                iterations: iteration,
            };
        }
        rate = next;
    }
    XirrOutcome::DidNotConverge
}
