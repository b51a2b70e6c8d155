//! Performance metrics: pure functions over NAV curves and label streams.
//!
//! Drawdowns and returns are fractions unless a name says `pct`.
//! Degenerate inputs give 0.0 rather than NaN; CAGR gives `None`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use factorlab_core::engine::Portfolio;

/// Knobs shared by the risk-adjusted metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annual risk-free rate used for Sharpe excess returns.
    pub risk_free_rate: f64,
    /// Trailing windows, in years, for rolling CAGR analytics.
    pub rolling_years: Vec<u32>,
    /// Periods in the rolling volatility window.
    pub volatility_window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.05,
            rolling_years: vec![1, 3, 5, 10],
            volatility_window: 12,
        }
    }
}

/// Summary statistics for one NAV curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub periods: usize,
    pub start_nav: f64,
    pub final_nav: f64,
    pub total_return: f64,
    pub cagr: Option<f64>,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub ulcer_index: f64,
    /// CAGR over |max drawdown|.
    pub calmar: f64,
}

impl PerformanceMetrics {
    pub fn compute(navs: &[f64], periods_per_year: f64, config: &MetricsConfig) -> Self {
        let returns = period_returns(navs);
        let cagr = cagr_of(navs, periods_per_year);
        let max_dd = max_drawdown(navs);
        let dd_pct: Vec<f64> = drawdown_series(navs).iter().map(|d| d * 100.0).collect();
        Self {
            periods: navs.len(),
            start_nav: navs.first().copied().unwrap_or(0.0),
            final_nav: navs.last().copied().unwrap_or(0.0),
            total_return: total_return(navs),
            cagr,
            max_drawdown: max_dd,
            volatility: annualized_volatility(&returns, periods_per_year),
            sharpe: sharpe_ratio(&returns, config.risk_free_rate, periods_per_year),
            ulcer_index: ulcer_index(&dd_pct),
            calmar: ratio_to_drawdown(cagr.unwrap_or(0.0), max_dd),
        }
    }

    /// Metrics of the strategy NAV of a simulated portfolio.
    pub fn of_portfolio(portfolio: &Portfolio, config: &MetricsConfig) -> Self {
        Self::compute(&portfolio.navs(), portfolio.periods_per_year, config)
    }
}

// ─── Returns and growth ─────────────────────────────────────────────

/// `(last - first) / first`, 0.0 for fewer than two values.
pub fn total_return(values: &[f64]) -> f64 {
    match (values.first(), values.last()) {
        (Some(&first), Some(&last)) if values.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// Compound annual growth rate between two values `years` apart.
pub fn cagr(start: f64, end: f64, years: f64) -> Option<f64> {
    if years <= 0.0 || start <= 0.0 || end < 0.0 || !years.is_finite() {
        return None;
    }
    Some((end / start).powf(1.0 / years) - 1.0)
}

/// CAGR of a value curve with `years = len / periods_per_year`.
pub fn cagr_of(values: &[f64], periods_per_year: f64) -> Option<f64> {
    let (&start, &end) = (values.first()?, values.last()?);
    cagr(start, end, values.len() as f64 / periods_per_year)
}

/// Simple period returns; one shorter than `values`.
pub fn period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

// ─── Drawdown ───────────────────────────────────────────────────────

/// Drawdown from the running peak at every point; all values <= 0.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    values
        .iter()
        .map(|&v| {
            peak = peak.max(v);
            if peak > 0.0 {
                (v / peak - 1.0).min(0.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Deepest drawdown, <= 0. 0.0 for an empty or non-decreasing curve.
pub fn max_drawdown(values: &[f64]) -> f64 {
    drawdown_series(values).into_iter().fold(0.0, f64::min)
}

/// Root mean square of the negative drawdowns, 0.0 if there are none.
///
/// Pass drawdowns in percent to get the index on the usual scale.
pub fn ulcer_index(drawdowns: &[f64]) -> f64 {
    let under: Vec<f64> = drawdowns.iter().copied().filter(|d| *d < 0.0).collect();
    if under.is_empty() {
        return 0.0;
    }
    (under.iter().map(|d| d * d).sum::<f64>() / under.len() as f64).sqrt()
}

/// `growth / |drawdown|`, 0.0 when the drawdown is zero.
///
/// With a SIP XIRR and a SIP value drawdown this is the MAR ratio.
pub fn ratio_to_drawdown(growth: f64, drawdown: f64) -> f64 {
    if drawdown == 0.0 {
        0.0
    } else {
        growth / drawdown.abs()
    }
}

// ─── Risk ───────────────────────────────────────────────────────────

/// Relative spread below which a return series counts as constant.
const DISPERSION_FLOOR: f64 = 1e-12;

/// Annualised Sharpe ratio of period returns against a constant
/// risk-free rate; 0.0 when the excess returns have no dispersion.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> f64 {
    let per_period = risk_free_rate / periods_per_year;
    let excess: Vec<f64> = returns.iter().map(|r| r - per_period).collect();
    let mean = mean_f64(&excess);
    let std = std_dev(&excess);
    if !std.is_finite() || std <= DISPERSION_FLOOR * mean.abs().max(1.0) {
        return 0.0;
    }
    mean / std * periods_per_year.sqrt()
}

/// Sample standard deviation scaled by `sqrt(periods_per_year)`.
pub fn annualized_volatility(returns: &[f64], periods_per_year: f64) -> f64 {
    std_dev(returns) * periods_per_year.sqrt()
}

// ─── Regimes ────────────────────────────────────────────────────────

/// Number of switches in a label stream.
///
/// Every change of label counts, including the first move away from "no
/// label"; that initial transition is then subtracted.
pub fn count_switches(labels: &[Option<&str>]) -> usize {
    let mut previous: Option<&str> = None;
    let mut changes = 0usize;
    for &label in labels {
        if label != previous {
            changes += 1;
        }
        previous = label;
    }
    changes.saturating_sub(1)
}

/// Time spent under one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeShare {
    pub label: String,
    pub periods: usize,
    pub share: f64,
}

/// Count and share of periods per label, ordered by label.
/// Unlabelled periods are reported as "none".
pub fn regime_distribution(labels: &[Option<&str>]) -> Vec<RegimeShare> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label.unwrap_or("none")).or_default() += 1;
    }
    let total = labels.len().max(1) as f64;
    counts
        .into_iter()
        .map(|(label, periods)| RegimeShare {
            label: label.to_string(),
            periods,
            share: periods as f64 / total,
        })
        .collect()
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Growth ──

    #[test]
    fn total_return_basic() {
        assert!((total_return(&[1000.0, 1050.0, 1100.0]) - 0.1).abs() < 1e-12);
        assert_eq!(total_return(&[1000.0]), 0.0);
        assert_eq!(total_return(&[]), 0.0);
    }

    #[test]
    fn cagr_doubling_in_two_years() {
        let c = cagr(100.0, 121.0, 2.0).unwrap();
        assert!((c - 0.1).abs() < 1e-12);
    }

    #[test]
    fn cagr_degenerate_inputs() {
        assert_eq!(cagr(100.0, 110.0, 0.0), None);
        assert_eq!(cagr(0.0, 110.0, 1.0), None);
        assert_eq!(cagr(-5.0, 110.0, 1.0), None);
        assert_eq!(cagr_of(&[], 12.0), None);
    }

    #[test]
    fn cagr_of_uses_row_count() {
        // 12 monthly values are one year by row count.
        let mut navs = vec![1000.0; 11];
        navs.push(1100.0);
        let c = cagr_of(&navs, 12.0).unwrap();
        assert!((c - 0.1).abs() < 1e-12);
    }

    // ── Drawdown ──

    #[test]
    fn drawdown_series_tracks_running_peak() {
        let dd = drawdown_series(&[100.0, 120.0, 90.0, 130.0, 117.0]);
        let expected = [0.0, 0.0, -0.25, 0.0, -0.1];
        for (a, e) in dd.iter().zip(expected) {
            assert!((a - e).abs() < 1e-12, "{a} vs {e}");
        }
        assert!((max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_monotonic_is_zero() {
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn ulcer_index_known_values() {
        // RMS of -3 and -4 over the two negative points.
        let u = ulcer_index(&[0.0, -3.0, -4.0, 0.0]);
        assert!((u - 12.5_f64.sqrt()).abs() < 1e-12);
        assert_eq!(ulcer_index(&[0.0, 0.0]), 0.0);
    }

    #[test]
    fn ratio_to_drawdown_zero_drawdown() {
        assert_eq!(ratio_to_drawdown(15.0, 0.0), 0.0);
        assert!((ratio_to_drawdown(15.0, -30.0) - 0.5).abs() < 1e-12);
    }

    // ── Risk ──

    #[test]
    fn sharpe_constant_returns_is_zero() {
        assert_eq!(sharpe_ratio(&[0.01; 24], 0.05, 12.0), 0.0);
    }

    #[test]
    fn sharpe_flat_cash_leg_is_zero() {
        // A cash-only stretch at 6.5% a year compounds to a constant return.
        let monthly = 1.065_f64.powf(1.0 / 12.0) - 1.0;
        assert_eq!(sharpe_ratio(&vec![monthly; 120], 0.05, 12.0), 0.0);
        assert_eq!(sharpe_ratio(&vec![0.05 / 52.0; 104], 0.05, 52.0), 0.0);
    }

    #[test]
    fn sharpe_positive_for_steady_outperformance() {
        let returns: Vec<f64> = (0..36)
            .map(|i| if i % 2 == 0 { 0.02 } else { 0.01 })
            .collect();
        let s = sharpe_ratio(&returns, 0.05, 12.0);
        assert!(s > 3.0, "sharpe {s}");
    }

    #[test]
    fn volatility_annualises_with_sqrt_periods() {
        let returns = [0.01, -0.01, 0.01, -0.01];
        let v = annualized_volatility(&returns, 12.0);
        assert!((v - std_dev(&returns) * 12.0_f64.sqrt()).abs() < 1e-15);
    }

    // ── Regimes ──

    #[test]
    fn switches_discount_initial_transition() {
        let labels = [
            None,
            None,
            Some("momentum"),
            Some("momentum"),
            Some("value"),
            Some("momentum"),
        ];
        assert_eq!(count_switches(&labels), 2);
        assert_eq!(count_switches(&[Some("value"); 5]), 0);
        assert_eq!(count_switches(&[]), 0);
    }

    #[test]
    fn distribution_counts_and_shares() {
        let labels = [Some("value"), Some("momentum"), Some("value"), None];
        let dist = regime_distribution(&labels);
        assert_eq!(dist.len(), 3);
        assert_eq!(dist[0].label, "momentum");
        assert_eq!(dist[2].label, "value");
        assert_eq!(dist[2].periods, 2);
        assert!((dist[2].share - 0.5).abs() < 1e-12);
    }

    #[test]
    fn compute_on_flat_curve() {
        let m = PerformanceMetrics::compute(&[1000.0; 24], 12.0, &MetricsConfig::default());
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.cagr, Some(0.0));
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.ulcer_index, 0.0);
    }
}
