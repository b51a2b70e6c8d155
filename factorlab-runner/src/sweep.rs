//! Parameter sweeps over one policy family.
//!
//! Every grid point is an independent backtest on the same prices, so the
//! sweep fans out with rayon and ranks afterwards. Ranking is by CAGR with
//! the run id as tie-break, so parallel and sequential sweeps agree.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use factorlab_core::policy::{
    build_policy, CooldownConfig, HysteresisConfig, PolicyConfig, ThresholdConfig,
};

use crate::config::BacktestConfig;
use crate::runner::{run_backtest, BacktestResult, LoadedPrices, RunError};

/// Policy family a grid varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridKind {
    Threshold,
    Hysteresis,
    Cooldown,
}

/// A list of policy configurations to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    pub policies: Vec<PolicyConfig>,
}

impl ParamGrid {
    pub fn default_for(kind: GridKind) -> Self {
        match kind {
            GridKind::Threshold => Self::threshold(
                &[1, 3, 6],
                &[10.0, 15.0, 20.0, 25.0],
                &[-10.0, -15.0, -20.0],
            ),
            GridKind::Hysteresis => {
                Self::hysteresis(&[3, 6, 9, 12], &[0.002, 0.003, 0.005], &[0.0005, 0.001])
            }
            GridKind::Cooldown => Self::cooldown(&[3, 6, 9, 12], &[1, 2, 3, 6]),
        }
    }

    pub fn threshold(lookbacks: &[usize], gains: &[f64], losses: &[f64]) -> Self {
        let mut policies = Vec::new();
        for &lookback in lookbacks {
            for &gain_threshold in gains {
                for &loss_threshold in losses {
                    policies.push(PolicyConfig::Threshold(ThresholdConfig {
                        lookback,
                        gain_threshold,
                        loss_threshold,
                    }));
                }
            }
        }
        Self { policies }
    }

    pub fn hysteresis(ma_windows: &[usize], enter: &[f64], exit: &[f64]) -> Self {
        let mut policies = Vec::new();
        for &ma_window in ma_windows {
            for &enter_band in enter {
                for &exit_band in exit {
                    policies.push(PolicyConfig::Hysteresis(HysteresisConfig {
                        ma_window,
                        enter_band,
                        exit_band,
                        ..HysteresisConfig::default()
                    }));
                }
            }
        }
        Self { policies }
    }

    pub fn cooldown(ma_windows: &[usize], cooldowns: &[usize]) -> Self {
        let mut policies = Vec::new();
        for &ma_window in ma_windows {
            for &cooldown in cooldowns {
                policies.push(PolicyConfig::Cooldown(CooldownConfig {
                    ma_window,
                    cooldown,
                    ..CooldownConfig::default()
                }));
            }
        }
        Self { policies }
    }

    pub fn size(&self) -> usize {
        self.policies.len()
    }

    /// One config per grid point, dropping points the policy rejects.
    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        self.policies
            .iter()
            .filter(|p| match build_policy(p) {
                Ok(_) => true,
                Err(e) => {
                    debug!(policy = p.name(), error = %e, "skipping invalid grid point");
                    false
                }
            })
            .map(|p| BacktestConfig {
                policy: p.clone(),
                ..base.clone()
            })
            .collect()
    }
}

/// Runs a grid against pre-loaded prices.
#[derive(Debug, Clone)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn sweep(
        &self,
        grid: &ParamGrid,
        base: &BacktestConfig,
        prices: &LoadedPrices,
    ) -> Result<SweepResults, RunError> {
        let configs = grid.generate_configs(base);
        info!(points = configs.len(), parallel = self.parallel, "starting sweep");

        let results: Vec<BacktestResult> = if self.parallel {
            configs
                .par_iter()
                .map(|config| run_backtest(config, prices))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            configs
                .iter()
                .map(|config| run_backtest(config, prices))
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(SweepResults::new(results))
    }
}

/// One ranked line of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRow {
    pub rank: usize,
    pub run_id: String,
    pub policy: PolicyConfig,
    pub cagr: f64,
    pub excess_cagr: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub switches: usize,
    pub sip_xirr_pct: f64,
}

/// Results from a parameter sweep, ranked best first.
#[derive(Debug)]
pub struct SweepResults {
    results: Vec<BacktestResult>,
}

impl SweepResults {
    fn new(mut results: Vec<BacktestResult>) -> Self {
        results.sort_by(|a, b| {
            b.cagr()
                .partial_cmp(&a.cagr())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Self { results }
    }

    pub fn all(&self) -> &[BacktestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&BacktestResult> {
        self.results.iter().find(|r| r.run_id == run_id)
    }

    pub fn best(&self) -> Option<&BacktestResult> {
        self.results.first()
    }

    pub fn top_n(&self, n: usize) -> &[BacktestResult] {
        &self.results[..n.min(self.results.len())]
    }

    pub fn rows(&self) -> Vec<SweepRow> {
        self.results
            .iter()
            .enumerate()
            .map(|(i, r)| SweepRow {
                rank: i + 1,
                run_id: r.run_id.clone(),
                policy: r.config.policy.clone(),
                cagr: r.cagr(),
                excess_cagr: r.excess_cagr(),
                max_drawdown: r.metrics.max_drawdown,
                sharpe: r.metrics.sharpe,
                switches: r.switches,
                sip_xirr_pct: r.sip.strategy.summary.xirr_pct,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::load_prices;

    fn base() -> BacktestConfig {
        let mut config = BacktestConfig::default();
        config.data.synthetic.months = 72;
        config
    }

    #[test]
    fn grid_sizes() {
        assert_eq!(ParamGrid::default_for(GridKind::Threshold).size(), 36);
        assert_eq!(ParamGrid::default_for(GridKind::Hysteresis).size(), 24);
        assert_eq!(ParamGrid::default_for(GridKind::Cooldown).size(), 16);
    }

    #[test]
    fn invalid_points_are_dropped() {
        let grid = ParamGrid::hysteresis(&[6], &[0.001, 0.003], &[0.002]);
        let configs = grid.generate_configs(&base());
        assert_eq!(configs.len(), 1);
        assert_eq!(
            configs[0].policy,
            PolicyConfig::Hysteresis(HysteresisConfig {
                enter_band: 0.003,
                exit_band: 0.002,
                ..HysteresisConfig::default()
            })
        );
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let base = base();
        let prices = load_prices(&base.data, false).unwrap();
        let grid = ParamGrid::cooldown(&[3, 6], &[1, 2]);

        let seq = ParamSweep::new()
            .with_parallelism(false)
            .sweep(&grid, &base, &prices)
            .unwrap();
        let par = ParamSweep::new()
            .with_parallelism(true)
            .sweep(&grid, &base, &prices)
            .unwrap();

        assert_eq!(seq.len(), 4);
        assert_eq!(seq.rows(), par.rows());
    }

    #[test]
    fn results_are_ranked_by_cagr() {
        let base = base();
        let prices = load_prices(&base.data, false).unwrap();
        let grid = ParamGrid::threshold(&[1, 3], &[10.0, 20.0], &[-10.0]);
        let results = ParamSweep::new().sweep(&grid, &base, &prices).unwrap();

        let rows = results.rows();
        assert!(rows.windows(2).all(|w| w[0].cagr >= w[1].cagr));
        assert_eq!(rows[0].rank, 1);
        let best = results.best().unwrap();
        assert_eq!(results.get(&best.run_id).map(|r| r.cagr()), Some(best.cagr()));
        assert_eq!(results.top_n(10).len(), 4);
    }
}
