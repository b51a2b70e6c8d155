//! Backtest runner: wires data, policy, lag, simulation and evaluation.
//!
//! Two entry points:
//! - `run_from_config()`: loads prices as the config describes, then runs. Used by the CLI.
//! - `run_backtest()`: takes pre-loaded prices. Used by the sweep, which loads once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use factorlab_core::data::{
    align_series, generate_monthly, read_price_csv, resample_series, AlignedSeries, DataError,
    Frequency,
};
use factorlab_core::domain::{Decision, PriceSeries, SeriesError, WeightVector};
use factorlab_core::engine::{enforce, simulate, Portfolio, SimError};
use factorlab_core::policy::{
    apply_trend_filter, build_policy, PolicyConfig, PolicyError, TrendFilter,
};

use crate::analytics::{
    allocation_histogram, average_run_length, calendar_year_returns, regime_runs,
    regime_transitions, return_stats, rolling_cagr, rolling_volatility, AllocationBucket,
    CalendarYear, RegimeRun, ReturnStats, Transition,
};
use crate::config::{BacktestConfig, ConfigError, DataConfig, RunId};
use crate::metrics::{count_switches, regime_distribution, PerformanceMetrics, RegimeShare};
use crate::sip::{simulate_sip, SipError, SipResult};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
    #[error("simulation error: {0}")]
    Sim(#[from] SimError),
    #[error("SIP error on {curve} NAV: {source}")]
    Sip {
        curve: &'static str,
        #[source]
        source: SipError,
    },
    #[error("no prices left in {start:?}..={end:?}")]
    EmptyRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

// ─── Data loading ────────────────────────────────────────────────────

/// Aligned prices plus where they came from.
#[derive(Debug, Clone)]
pub struct LoadedPrices {
    pub aligned: AlignedSeries,
    /// BLAKE3 over dates and closes of every column.
    pub dataset_hash: String,
    pub synthetic: bool,
    pub warnings: Vec<String>,
}

impl LoadedPrices {
    pub fn new(aligned: AlignedSeries, synthetic: bool) -> Self {
        let dataset_hash = dataset_hash(&aligned);
        Self {
            aligned,
            dataset_hash,
            synthetic,
            warnings: Vec::new(),
        }
    }
}

/// Load, resample, trim and align the configured price files, or generate
/// synthetic ones when no file is configured.
///
/// Momentum-only policies skip the value file even when one is set.
pub fn load_prices(data: &DataConfig, momentum_only: bool) -> Result<LoadedPrices, RunError> {
    let mut warnings = Vec::new();
    let mut series = Vec::with_capacity(2);

    match &data.momentum {
        Some(momentum) => {
            let paths = std::iter::once(momentum)
                .chain(data.value.iter().filter(|_| !momentum_only));
            for path in paths {
                let (raw, report) = read_price_csv(path).map_err(DataError::from)?;
                if report.rows_skipped > 0 {
                    warnings.push(format!(
                        "{}: skipped {} of {} rows without a usable close",
                        path.display(),
                        report.rows_skipped,
                        report.rows_read
                    ));
                }
                let resampled = resample_series(&raw, data.frequency);
                series.push(within(&resampled, data.start, data.end).map_err(DataError::from)?);
            }
        }
        None => {
            let syn = &data.synthetic;
            if data.frequency != Frequency::Monthly {
                warnings.push("synthetic prices are monthly; data.frequency ignored".into());
            }
            let momentum = generate_monthly(
                "MOMENTUM",
                syn.start,
                syn.months,
                syn.momentum_drift,
                syn.momentum_vol,
                syn.seed,
            );
            let value = generate_monthly(
                "VALUE",
                syn.start,
                syn.months,
                syn.value_drift,
                syn.value_vol,
                syn.seed.wrapping_add(1),
            );
            for s in [momentum, value] {
                series.push(within(&s, data.start, data.end).map_err(DataError::from)?);
            }
        }
    }

    if series.iter().any(|s| s.is_empty()) {
        return Err(RunError::EmptyRange {
            start: data.start,
            end: data.end,
        });
    }
    let aligned = match series.as_slice() {
        [only] => AlignedSeries::single(only),
        _ => align_series(&series),
    }
    .map_err(DataError::from)?;
    for w in &warnings {
        warn!("{w}");
    }

    let mut loaded = LoadedPrices::new(aligned, data.momentum.is_none());
    loaded.warnings = warnings;
    debug!(
        rows = loaded.aligned.len(),
        series = ?loaded.aligned.names(),
        hash = %loaded.dataset_hash,
        "prices loaded"
    );
    Ok(loaded)
}

/// Keep the points inside an inclusive date range.
fn within(
    series: &PriceSeries,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<PriceSeries, SeriesError> {
    let points = series
        .points()
        .iter()
        .filter(|p| start.map_or(true, |s| p.date >= s) && end.map_or(true, |e| p.date <= e))
        .copied()
        .collect();
    PriceSeries::new(series.name(), points)
}

/// Deterministic hash over dates and all closes, in column order.
fn dataset_hash(aligned: &AlignedSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for date in aligned.dates() {
        hasher.update(date.to_string().as_bytes());
    }
    for (i, name) in aligned.names().iter().enumerate() {
        hasher.update(name.as_bytes());
        for close in aligned.column(i).unwrap_or_default() {
            hasher.update(&close.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

// ─── Result ──────────────────────────────────────────────────────────

/// SIP outcomes on the three NAV curves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipComparison {
    pub strategy: SipResult,
    pub benchmark: SipResult,
    pub momentum: SipResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingCagr {
    pub years: u32,
    pub strategy: Vec<Option<f64>>,
    pub benchmark: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub calendar_years: Vec<CalendarYear>,
    pub rolling_cagr: Vec<RollingCagr>,
    /// Annualised, `None` while the window is filling.
    pub rolling_volatility: Vec<Option<f64>>,
    pub regime_runs: Vec<RegimeRun>,
    pub average_run_length: f64,
    pub transitions: Vec<Transition>,
    pub allocation_histogram: Vec<AllocationBucket>,
    pub return_stats: Option<ReturnStats>,
    pub total_turnover: f64,
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub policy: String,
    pub config: BacktestConfig,
    pub series: Vec<String>,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub data_warnings: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Raw policy intentions, before lag.
    pub decisions: Vec<Decision>,
    pub portfolio: Portfolio,
    pub metrics: PerformanceMetrics,
    pub benchmark_metrics: PerformanceMetrics,
    pub momentum_metrics: PerformanceMetrics,
    pub value_metrics: Option<PerformanceMetrics>,
    pub switches: usize,
    pub regime_distribution: Vec<RegimeShare>,
    pub sip: SipComparison,
    pub analytics: Analytics,
}

impl BacktestResult {
    pub fn cagr(&self) -> f64 {
        self.metrics.cagr.unwrap_or(0.0)
    }

    pub fn excess_cagr(&self) -> f64 {
        self.cagr() - self.benchmark_metrics.cagr.unwrap_or(0.0)
    }
}

// ─── Entry points ────────────────────────────────────────────────────

/// Static benchmark used when the config does not name one: 50/50 for
/// momentum/value policies, 75/25 momentum/cash for momentum-only ones.
pub fn default_benchmark(policy: &PolicyConfig) -> WeightVector {
    if policy.is_momentum_only() {
        WeightVector {
            momentum: 0.75,
            value: 0.0,
            cash: 0.25,
        }
    } else {
        WeightVector::BALANCED
    }
}

/// Load the configured prices and run one backtest.
pub fn run_from_config(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let prices = load_prices(&config.data, config.policy.is_momentum_only())?;
    run_backtest(config, &prices)
}

/// Run one backtest on pre-loaded prices. No I/O.
pub fn run_backtest(
    config: &BacktestConfig,
    prices: &LoadedPrices,
) -> Result<BacktestResult, RunError> {
    let aligned = &prices.aligned;
    let policy = build_policy(&config.policy)?;
    let run = policy.run(aligned)?;
    let default_weights = config.initial_weights.unwrap_or_else(|| policy.initial_weights());
    let effective = enforce(&run.decisions, policy.decision_lag(), default_weights);

    let sim = config.sim_config();
    let benchmark = sim
        .benchmark
        .unwrap_or_else(|| default_benchmark(&config.policy));
    let mut portfolio = simulate(aligned, &effective, &sim, benchmark)?;

    if let Some(tf) = &config.trend_filter {
        let filter = TrendFilter::new(tf.clone())?;
        let filtered = apply_trend_filter(&effective, &portfolio.navs(), &filter);
        let risk_off = filtered
            .iter()
            .filter(|d| d.weights == WeightVector::ALL_CASH)
            .count();
        debug!(risk_off, "trend filter applied");
        portfolio = simulate(aligned, &filtered, &sim, benchmark)?;
    }

    let ppy = portfolio.periods_per_year;
    let metrics = PerformanceMetrics::of_portfolio(&portfolio, &config.metrics);
    let benchmark_metrics =
        PerformanceMetrics::compute(&portfolio.benchmark_navs(), ppy, &config.metrics);
    let momentum_navs: Vec<f64> = portfolio.periods.iter().map(|p| p.momentum_nav).collect();
    let momentum_metrics = PerformanceMetrics::compute(&momentum_navs, ppy, &config.metrics);
    let value_navs: Option<Vec<f64>> = portfolio.periods.iter().map(|p| p.value_nav).collect();
    let value_metrics = value_navs
        .filter(|v| !v.is_empty())
        .map(|v| PerformanceMetrics::compute(&v, ppy, &config.metrics));

    let labels = portfolio.labels();
    let switches = count_switches(&labels);
    let distribution = regime_distribution(&labels);

    let dates = portfolio.dates();
    let sip_on = |curve: &'static str, navs: &[f64]| -> Result<SipResult, RunError> {
        let result = simulate_sip(&dates, navs, &config.sip, ppy)
            .map_err(|source| RunError::Sip { curve, source })?;
        if !result.summary.xirr.converged() {
            warn!(curve, "SIP XIRR did not converge, reporting 0%");
        }
        Ok(result)
    };
    let sip = SipComparison {
        strategy: sip_on("strategy", &portfolio.navs())?,
        benchmark: sip_on("benchmark", &portfolio.benchmark_navs())?,
        momentum: sip_on("momentum", &momentum_navs)?,
    };

    let analytics = build_analytics(&portfolio, config);

    let result = BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id: config.run_id()?,
        policy: policy.policy_name().to_string(),
        config: config.clone(),
        series: aligned.names().to_vec(),
        dataset_hash: prices.dataset_hash.clone(),
        has_synthetic: prices.synthetic,
        data_warnings: prices.warnings.clone(),
        start_date: dates.first().copied(),
        end_date: dates.last().copied(),
        decisions: run.decisions,
        portfolio,
        metrics,
        benchmark_metrics,
        momentum_metrics,
        value_metrics,
        switches,
        regime_distribution: distribution,
        sip,
        analytics,
    };

    info!(
        policy = %result.policy,
        periods = result.portfolio.len(),
        cagr = result.cagr(),
        max_drawdown = result.metrics.max_drawdown,
        switches = result.switches,
        sip_xirr_pct = result.sip.strategy.summary.xirr_pct,
        "backtest complete"
    );
    Ok(result)
}

fn build_analytics(portfolio: &Portfolio, config: &BacktestConfig) -> Analytics {
    let dates = portfolio.dates();
    let navs = portfolio.navs();
    let bench = portfolio.benchmark_navs();
    let runs = regime_runs(portfolio);
    Analytics {
        calendar_years: calendar_year_returns(portfolio),
        rolling_cagr: config
            .metrics
            .rolling_years
            .iter()
            .map(|&years| RollingCagr {
                years,
                strategy: rolling_cagr(&dates, &navs, years),
                benchmark: rolling_cagr(&dates, &bench, years),
            })
            .collect(),
        rolling_volatility: rolling_volatility(
            &navs,
            config.metrics.volatility_window,
            portfolio.periods_per_year,
        )
        .into_iter()
        .map(|v| v.is_finite().then_some(v))
        .collect(),
        average_run_length: average_run_length(&runs),
        regime_runs: runs,
        transitions: regime_transitions(portfolio),
        allocation_histogram: allocation_histogram(portfolio),
        return_stats: return_stats(&portfolio.returns()),
        total_turnover: portfolio.total_turnover(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::policy::{RiskScoreConfig, ThresholdConfig};

    fn synthetic(months: usize) -> BacktestConfig {
        let mut config = BacktestConfig::default();
        config.data.synthetic.months = months;
        config
    }

    #[test]
    fn synthetic_run_produces_full_result() {
        let config = synthetic(120);
        let result = run_from_config(&config).unwrap();
        assert_eq!(result.portfolio.len(), 120);
        assert_eq!(result.decisions.len(), 120);
        assert!(result.has_synthetic);
        assert_eq!(result.policy, "hysteresis");
        assert_eq!(result.series, vec!["MOMENTUM".to_string(), "VALUE".to_string()]);
        assert_eq!(result.portfolio.benchmark, WeightVector::BALANCED);
        assert_eq!(result.sip.strategy.rows.len(), 120);
        assert_eq!(result.analytics.rolling_cagr.len(), 4);
        assert!(result.value_metrics.is_some());
        assert_eq!(result.run_id, config.run_id().unwrap());
    }

    #[test]
    fn same_config_same_result() {
        let config = synthetic(60);
        let a = run_from_config(&config).unwrap();
        let b = run_from_config(&config).unwrap();
        assert_eq!(a.portfolio, b.portfolio);
        assert_eq!(a.dataset_hash, b.dataset_hash);
    }

    #[test]
    fn dataset_hash_tracks_seed() {
        let mut a = synthetic(36);
        let b = a.clone();
        a.data.synthetic.seed = 7;
        let la = load_prices(&a.data, false).unwrap();
        let lb = load_prices(&b.data, false).unwrap();
        assert_ne!(la.dataset_hash, lb.dataset_hash);
    }

    #[test]
    fn risk_score_uses_cash_benchmark() {
        let mut config = synthetic(72);
        config.policy = PolicyConfig::RiskScore(RiskScoreConfig::default());
        let result = run_from_config(&config).unwrap();
        assert_eq!(result.portfolio.benchmark.value, 0.0);
        assert_eq!(result.portfolio.benchmark.cash, 0.25);
        for p in &result.portfolio.periods {
            assert_eq!(p.weights.value, 0.0);
        }
    }

    #[test]
    fn initial_weights_override_policy_default() {
        let mut config = synthetic(24);
        config.policy = PolicyConfig::Threshold(ThresholdConfig::default());
        config.initial_weights = Some(WeightVector::ALL_CASH);
        let result = run_from_config(&config).unwrap();
        assert_eq!(result.portfolio.periods[0].weights, WeightVector::ALL_CASH);
    }

    #[test]
    fn date_range_trims_prices() {
        let mut config = synthetic(60);
        config.data.start = NaiveDate::from_ymd_opt(2007, 1, 1);
        config.data.end = NaiveDate::from_ymd_opt(2008, 12, 31);
        let loaded = load_prices(&config.data, false).unwrap();
        assert_eq!(loaded.aligned.len(), 24);
        assert_eq!(
            loaded.aligned.dates().first().copied(),
            NaiveDate::from_ymd_opt(2007, 1, 31)
        );
    }

    #[test]
    fn empty_range_is_an_error() {
        let mut config = synthetic(24);
        config.data.start = NaiveDate::from_ymd_opt(2030, 1, 1);
        assert!(matches!(
            load_prices(&config.data, false),
            Err(RunError::EmptyRange { .. })
        ));
    }

    #[test]
    fn trend_filter_moves_some_periods_to_cash() {
        let mut config = synthetic(240);
        config.data.synthetic.momentum_drift = -0.01;
        config.data.synthetic.value_drift = -0.01;
        config.trend_filter = Some(Default::default());
        let result = run_from_config(&config).unwrap();
        let cash = result
            .portfolio
            .periods
            .iter()
            .filter(|p| p.weights == WeightVector::ALL_CASH)
            .count();
        assert!(cash > 0);
    }
}
