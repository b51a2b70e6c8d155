//! Descriptive analytics over a simulated portfolio.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use factorlab_core::engine::Portfolio;
use factorlab_core::signals::rolling::{rolling_std, Window};

use crate::metrics::cagr;

const DAYS_PER_YEAR: f64 = 365.25;

/// Compounded returns inside one calendar year, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarYear {
    pub year: i32,
    pub strategy_pct: f64,
    pub benchmark_pct: f64,
    pub momentum_pct: f64,
    pub value_pct: Option<f64>,
    pub avg_momentum_weight: f64,
    pub avg_value_weight: f64,
    pub avg_cash_weight: f64,
}

impl CalendarYear {
    pub fn outperformance_pct(&self) -> f64 {
        self.strategy_pct - self.benchmark_pct
    }
}

pub fn calendar_year_returns(portfolio: &Portfolio) -> Vec<CalendarYear> {
    #[derive(Default)]
    struct Acc {
        strategy: f64,
        benchmark: f64,
        momentum: f64,
        value: Option<f64>,
        weights: [f64; 3],
        rows: usize,
    }

    let mut years: BTreeMap<i32, Acc> = BTreeMap::new();
    for p in &portfolio.periods {
        let acc = years.entry(p.date.year()).or_insert_with(|| Acc {
            strategy: 1.0,
            benchmark: 1.0,
            momentum: 1.0,
            value: p.value_nav.map(|_| 1.0),
            ..Acc::default()
        });
        acc.strategy *= 1.0 + p.portfolio_return.unwrap_or(0.0);
        acc.benchmark *= 1.0 + p.benchmark_return.unwrap_or(0.0);
        acc.momentum *= 1.0 + p.momentum_return.unwrap_or(0.0);
        if let Some(v) = acc.value.as_mut() {
            *v *= 1.0 + p.value_return.unwrap_or(0.0);
        }
        acc.weights[0] += p.weights.momentum;
        acc.weights[1] += p.weights.value;
        acc.weights[2] += p.weights.cash;
        acc.rows += 1;
    }

    years
        .into_iter()
        .map(|(year, acc)| {
            let n = acc.rows as f64;
            CalendarYear {
                year,
                strategy_pct: (acc.strategy - 1.0) * 100.0,
                benchmark_pct: (acc.benchmark - 1.0) * 100.0,
                momentum_pct: (acc.momentum - 1.0) * 100.0,
                value_pct: acc.value.map(|v| (v - 1.0) * 100.0),
                avg_momentum_weight: acc.weights[0] / n,
                avg_value_weight: acc.weights[1] / n,
                avg_cash_weight: acc.weights[2] / n,
            }
        })
        .collect()
}

/// Trailing `years`-year CAGR at every date.
///
/// The start point is the last date on or before `date - years`; the
/// elapsed time is measured in days over 365.25. `None` until enough
/// history exists.
pub fn rolling_cagr(dates: &[NaiveDate], values: &[f64], years: u32) -> Vec<Option<f64>> {
    dates
        .iter()
        .zip(values)
        .map(|(&end_date, &end)| {
            let target = end_date.checked_sub_months(Months::new(years * 12))?;
            let start_idx = dates.partition_point(|d| *d <= target).checked_sub(1)?;
            let elapsed = (end_date - dates[start_idx]).num_days() as f64 / DAYS_PER_YEAR;
            cagr(values[start_idx], end, elapsed)
        })
        .collect()
}

/// Annualised volatility of period returns over a trailing window.
/// The first entry lines up with the first NAV, which has no return.
pub fn rolling_volatility(navs: &[f64], window: usize, periods_per_year: f64) -> Vec<f64> {
    let returns = factorlab_core::data::simple_returns(navs);
    rolling_std(&returns, Window::full(window))
        .into_iter()
        .map(|s| s * periods_per_year.sqrt())
        .collect()
}

/// A maximal run of consecutive periods under one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRun {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub periods: usize,
}

pub fn regime_runs(portfolio: &Portfolio) -> Vec<RegimeRun> {
    let mut runs: Vec<RegimeRun> = Vec::new();
    for p in &portfolio.periods {
        let label = p.label().unwrap_or("none");
        match runs.last_mut() {
            Some(run) if run.label == label => {
                run.end = p.date;
                run.periods += 1;
            }
            _ => runs.push(RegimeRun {
                label: label.to_string(),
                start: p.date,
                end: p.date,
                periods: 1,
            }),
        }
    }
    runs
}

pub fn average_run_length(runs: &[RegimeRun]) -> f64 {
    if runs.is_empty() {
        return 0.0;
    }
    runs.iter().map(|r| r.periods).sum::<usize>() as f64 / runs.len() as f64
}

/// A change of label between consecutive periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub date: NaiveDate,
    pub from: String,
    pub to: String,
    pub momentum_weight: f64,
    pub score: Option<f64>,
}

pub fn regime_transitions(portfolio: &Portfolio) -> Vec<Transition> {
    portfolio
        .periods
        .windows(2)
        .filter_map(|w| {
            let (from, to) = (w[0].label()?, w[1].label()?);
            (from != to).then(|| Transition {
                date: w[1].date,
                from: from.to_string(),
                to: to.to_string(),
                momentum_weight: w[1].weights.momentum,
                score: w[1].score,
            })
        })
        .collect()
}

/// Momentum-weight buckets: [0, 0.3], (0.3, 0.5], (0.5, 0.7], (0.7, 1].
pub const ALLOCATION_BUCKETS: [(&str, f64); 4] = [
    ("value_heavy", 0.3),
    ("balanced", 0.5),
    ("slight_momentum", 0.7),
    ("momentum_heavy", 1.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationBucket {
    pub label: String,
    pub upper: f64,
    pub periods: usize,
}

pub fn allocation_histogram(portfolio: &Portfolio) -> Vec<AllocationBucket> {
    let mut buckets: Vec<AllocationBucket> = ALLOCATION_BUCKETS
        .iter()
        .map(|&(label, upper)| AllocationBucket {
            label: label.to_string(),
            upper,
            periods: 0,
        })
        .collect();
    for p in &portfolio.periods {
        let w = p.weights.momentum;
        if let Some(b) = buckets.iter_mut().find(|b| w <= b.upper + 1e-12) {
            b.periods += 1;
        }
    }
    buckets
}

/// Distribution of single-period returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStats {
    pub best_pct: f64,
    pub worst_pct: f64,
    pub positive_share: f64,
}

pub fn return_stats(returns: &[f64]) -> Option<ReturnStats> {
    if returns.is_empty() {
        return None;
    }
    let best = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let worst = returns.iter().copied().fold(f64::INFINITY, f64::min);
    let positive = returns.iter().filter(|r| **r > 0.0).count();
    Some(ReturnStats {
        best_pct: best * 100.0,
        worst_pct: worst * 100.0,
        positive_share: positive as f64 / returns.len() as f64,
    })
}
