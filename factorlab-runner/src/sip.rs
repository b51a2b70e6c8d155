//! Systematic investment plan (SIP) simulation on a NAV series.
//!
//! Each period invests a contribution at that period's NAV. The dynamic
//! variant scales the contribution by how far the NAV sits below its
//! all-time high.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use factorlab_core::domain::CashFlow;

use crate::metrics::{cagr, ratio_to_drawdown, ulcer_index};
use crate::xirr::{xirr, XirrOutcome};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SipError {
    #[error("SIP needs at least one NAV")]
    Empty,

    #[error("{dates} dates but {navs} NAV values")]
    LengthMismatch { dates: usize, navs: usize },

    #[error("NAV on {date} must be positive and finite, got {nav}")]
    InvalidNav { date: NaiveDate, nav: f64 },

    #[error("SIP amount must be positive, got {0}")]
    InvalidAmount(f64),

    #[error("invalid dynamic SIP tier: {0}")]
    InvalidTier(String),
}

/// Contribution multiplier applied once the NAV is at least `depth_pct`
/// percent below its all-time high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SipTier {
    pub depth_pct: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicSip {
    /// Multiplier when no tier applies.
    pub base_multiplier: f64,
    pub tiers: Vec<SipTier>,
}

impl Default for DynamicSip {
    fn default() -> Self {
        Self {
            base_multiplier: 1.0,
            tiers: vec![
                SipTier { depth_pct: 10.0, multiplier: 2.0 },
                SipTier { depth_pct: 20.0, multiplier: 4.0 },
                SipTier { depth_pct: 30.0, multiplier: 6.0 },
            ],
        }
    }
}

impl DynamicSip {
    /// Multiplier of the deepest tier reached by `depth_pct`.
    pub fn multiplier(&self, depth_pct: f64) -> f64 {
        self.tiers
            .iter()
            .filter(|t| depth_pct >= t.depth_pct)
            .max_by(|a, b| a.depth_pct.total_cmp(&b.depth_pct))
            .map_or(self.base_multiplier, |t| t.multiplier)
    }

    fn validate(&self) -> Result<(), SipError> {
        if self.base_multiplier.is_nan() || self.base_multiplier <= 0.0 {
            return Err(SipError::InvalidTier(format!(
                "base multiplier must be positive, got {}",
                self.base_multiplier
            )));
        }
        for t in &self.tiers {
            if t.multiplier.is_nan() || t.multiplier <= 0.0 || !(0.0..100.0).contains(&t.depth_pct) {
                return Err(SipError::InvalidTier(format!(
                    "depth {}% multiplier {}",
                    t.depth_pct, t.multiplier
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    /// Base contribution per period.
    pub amount: f64,
    pub dynamic: Option<DynamicSip>,
}

impl Default for SipConfig {
    fn default() -> Self {
        Self {
            amount: 10_000.0,
            dynamic: None,
        }
    }
}

impl SipConfig {
    pub fn validate(&self) -> Result<(), SipError> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(SipError::InvalidAmount(self.amount));
        }
        if let Some(d) = &self.dynamic {
            d.validate()?;
        }
        Ok(())
    }
}

/// One period of the plan. Percentages are in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipRow {
    pub date: NaiveDate,
    pub nav: f64,
    /// Depth of the NAV below its all-time high, >= 0.
    pub nav_below_high_pct: f64,
    pub multiplier: f64,
    pub contribution: f64,
    pub units_bought: f64,
    pub units: f64,
    pub invested: f64,
    pub value: f64,
    /// Value against its running peak, <= 0.
    pub value_drawdown_pct: f64,
    /// `value / invested`.
    pub equity_multiple: f64,
    /// Equity multiple against its running peak, <= 0.
    pub investor_drawdown_pct: f64,
    /// `(value - invested) / invested`.
    pub gain_vs_invested_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipSummary {
    pub periods: usize,
    pub total_invested: f64,
    pub final_value: f64,
    pub absolute_gain: f64,
    pub total_return_pct: f64,
    pub xirr: XirrOutcome,
    /// XIRR in percent, 0.0 when the solver failed.
    pub xirr_pct: f64,
    pub max_value_drawdown_pct: f64,
    pub max_investor_drawdown_pct: f64,
    pub worst_gain_vs_invested_pct: f64,
    /// XIRR over |max value drawdown|.
    pub mar_ratio: f64,
    pub ulcer_index: f64,
    pub start_nav: f64,
    pub end_nav: f64,
    /// CAGR of the NAV itself, in percent.
    pub nav_cagr_pct: Option<f64>,
    pub total_units: f64,
    pub average_cost: f64,
    pub average_contribution: f64,
    pub max_contribution: f64,
    /// Periods spent at each multiplier, ascending.
    pub multiplier_usage: Vec<(f64, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipResult {
    pub rows: Vec<SipRow>,
    pub cash_flows: Vec<CashFlow>,
    pub summary: SipSummary,
}

/// Run a SIP over `nav`, one contribution per date.
pub fn simulate_sip(
    dates: &[NaiveDate],
    nav: &[f64],
    config: &SipConfig,
    periods_per_year: f64,
) -> Result<SipResult, SipError> {
    config.validate()?;
    if dates.len() != nav.len() {
        return Err(SipError::LengthMismatch {
            dates: dates.len(),
            navs: nav.len(),
        });
    }
    if nav.is_empty() {
        return Err(SipError::Empty);
    }
    if let Some((&date, &bad)) = dates
        .iter()
        .zip(nav)
        .find(|(_, v)| !v.is_finite() || **v <= 0.0)
    {
        return Err(SipError::InvalidNav { date, nav: bad });
    }

    let mut rows = Vec::with_capacity(nav.len());
    let mut nav_high = f64::NEG_INFINITY;
    let mut value_peak = f64::NEG_INFINITY;
    let mut multiple_peak = f64::NEG_INFINITY;
    let mut units = 0.0;
    let mut invested = 0.0;

    for (&date, &price) in dates.iter().zip(nav) {
        nav_high = nav_high.max(price);
        let below_high = (nav_high - price) / nav_high * 100.0;
        let multiplier = config
            .dynamic
            .as_ref()
            .map_or(1.0, |d| d.multiplier(below_high));
        let contribution = config.amount * multiplier;
        let units_bought = contribution / price;
        units += units_bought;
        invested += contribution;
        let value = units * price;
        value_peak = value_peak.max(value);
        let equity_multiple = value / invested;
        multiple_peak = multiple_peak.max(equity_multiple);

        rows.push(SipRow {
            date,
            nav: price,
            nav_below_high_pct: below_high,
            multiplier,
            contribution,
            units_bought,
            units,
            invested,
            value,
            value_drawdown_pct: (value / value_peak - 1.0) * 100.0,
            equity_multiple,
            investor_drawdown_pct: (equity_multiple / multiple_peak - 1.0) * 100.0,
            gain_vs_invested_pct: (value - invested) / invested * 100.0,
        });
    }

    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Err(SipError::Empty);
    };
    let mut cash_flows: Vec<CashFlow> = rows
        .iter()
        .map(|r| CashFlow::contribution(r.date, r.contribution))
        .collect();
    cash_flows.push(CashFlow::redemption(last.date, last.value));
    let summary = summarize(&rows, first, last, &cash_flows, periods_per_year);
    Ok(SipResult {
        rows,
        cash_flows,
        summary,
    })
}

fn summarize(
    rows: &[SipRow],
    first: &SipRow,
    last: &SipRow,
    cash_flows: &[CashFlow],
    periods_per_year: f64,
) -> SipSummary {
    let min_of = |f: fn(&SipRow) -> f64| rows.iter().map(f).fold(0.0, f64::min);
    let outcome = xirr(cash_flows);
    let xirr_pct = outcome.percent_or_zero();
    let max_value_dd = min_of(|r| r.value_drawdown_pct);
    let value_dd: Vec<f64> = rows.iter().map(|r| r.value_drawdown_pct).collect();

    let mut usage: Vec<(f64, usize)> = Vec::new();
    for r in rows {
        match usage.iter_mut().find(|(m, _)| *m == r.multiplier) {
            Some((_, n)) => *n += 1,
            None => usage.push((r.multiplier, 1)),
        }
    }
    usage.sort_by(|a, b| a.0.total_cmp(&b.0));

    SipSummary {
        periods: rows.len(),
        total_invested: last.invested,
        final_value: last.value,
        absolute_gain: last.value - last.invested,
        total_return_pct: (last.value - last.invested) / last.invested * 100.0,
        xirr: outcome,
        xirr_pct,
        max_value_drawdown_pct: max_value_dd,
        max_investor_drawdown_pct: min_of(|r| r.investor_drawdown_pct),
        worst_gain_vs_invested_pct: min_of(|r| r.gain_vs_invested_pct),
        mar_ratio: ratio_to_drawdown(xirr_pct, max_value_dd),
        ulcer_index: ulcer_index(&value_dd),
        start_nav: first.nav,
        end_nav: last.nav,
        nav_cagr_pct: cagr(first.nav, last.nav, rows.len() as f64 / periods_per_year)
            .map(|c| c * 100.0),
        total_units: last.units,
        average_cost: last.invested / last.units,
        average_contribution: last.invested / rows.len() as f64,
        max_contribution: rows.iter().map(|r| r.contribution).fold(0.0, f64::max),
        multiplier_usage: usage,
    }
}
