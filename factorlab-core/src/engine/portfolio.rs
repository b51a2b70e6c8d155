//! Portfolio simulation.
//!
//! Effective weights multiply each period's sleeve returns:
//! `r_p = w_m r_m + w_v r_v + w_c r_c`, compounded into a NAV from a fixed
//! base. Period 0 has no return; its NAV is the base exactly. A static
//! benchmark is compounded alongside with the same rule.

use crate::data::{simple_returns, AlignedSeries};
use crate::domain::{Decision, Regime, WeightError, WeightVector};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("{weights} effective allocations for {prices} price rows")]
    LengthMismatch { prices: usize, weights: usize },

    #[error("allocation dated {found} does not match price date {expected}")]
    DateMismatch { expected: NaiveDate, found: NaiveDate },

    #[error("value weight on {0} but no value series was supplied")]
    MissingValueSeries(NaiveDate),

    #[error("base NAV must be positive, got {0}")]
    InvalidBase(f64),

    #[error("invalid allocation on {date}: {source}")]
    Weights {
        date: NaiveDate,
        #[source]
        source: WeightError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub base_nav: f64,
    /// Annual return earned by the cash sleeve.
    pub cash_annual_return: f64,
    pub periods_per_year: f64,
    /// Static benchmark weights. `None` lets the caller pick one that
    /// matches the policy family.
    pub benchmark: Option<WeightVector>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_nav: 1000.0,
            cash_annual_return: 0.05,
            periods_per_year: 12.0,
            benchmark: None,
        }
    }
}

impl SimConfig {
    /// Per-period cash return from the annual assumption.
    pub fn cash_period_return(&self) -> f64 {
        (1.0 + self.cash_annual_return).powf(1.0 / self.periods_per_year) - 1.0
    }
}

/// One row of the simulated portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPeriod {
    pub date: NaiveDate,
    pub weights: WeightVector,
    pub regime: Option<Regime>,
    pub score: Option<f64>,
    pub momentum_return: Option<f64>,
    pub value_return: Option<f64>,
    pub cash_return: f64,
    pub portfolio_return: Option<f64>,
    pub nav: f64,
    pub benchmark_return: Option<f64>,
    pub benchmark_nav: f64,
    /// Momentum and value legs rebased to the base NAV.
    pub momentum_nav: f64,
    pub value_nav: Option<f64>,
    pub momentum_contribution: f64,
    pub value_contribution: f64,
    pub cash_contribution: f64,
    /// One-way turnover against the previous period's weights.
    pub turnover: f64,
}

impl PortfolioPeriod {
    pub fn excess_return(&self) -> Option<f64> {
        Some(self.portfolio_return? - self.benchmark_return?)
    }

    pub fn label(&self) -> Option<&'static str> {
        Decision {
            date: self.date,
            weights: self.weights,
            regime: self.regime,
            score: self.score,
        }
        .label()
    }
}

/// A simulated portfolio and its benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub periods: Vec<PortfolioPeriod>,
    pub base_nav: f64,
    pub periods_per_year: f64,
    pub benchmark: WeightVector,
}

impl Portfolio {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.periods.iter().map(|p| p.date).collect()
    }

    pub fn navs(&self) -> Vec<f64> {
        self.periods.iter().map(|p| p.nav).collect()
    }

    pub fn benchmark_navs(&self) -> Vec<f64> {
        self.periods.iter().map(|p| p.benchmark_nav).collect()
    }

    /// Portfolio returns for periods 1.. (period 0 has none).
    pub fn returns(&self) -> Vec<f64> {
        self.periods.iter().filter_map(|p| p.portfolio_return).collect()
    }

    pub fn benchmark_returns(&self) -> Vec<f64> {
        self.periods.iter().filter_map(|p| p.benchmark_return).collect()
    }

    pub fn final_nav(&self) -> Option<f64> {
        self.periods.last().map(|p| p.nav)
    }

    pub fn labels(&self) -> Vec<Option<&'static str>> {
        self.periods.iter().map(|p| p.label()).collect()
    }

    pub fn total_turnover(&self) -> f64 {
        self.periods.iter().map(|p| p.turnover).sum()
    }
}

/// Compound effective allocations over aligned prices.
pub fn simulate(
    prices: &AlignedSeries,
    effective: &[Decision],
    config: &SimConfig,
    benchmark: WeightVector,
) -> Result<Portfolio, SimError> {
    if prices.len() != effective.len() {
        return Err(SimError::LengthMismatch {
            prices: prices.len(),
            weights: effective.len(),
        });
    }
    if config.base_nav.is_nan() || config.base_nav <= 0.0 {
        return Err(SimError::InvalidBase(config.base_nav));
    }
    if prices.is_empty() {
        return Ok(Portfolio {
            periods: Vec::new(),
            base_nav: config.base_nav,
            periods_per_year: config.periods_per_year,
            benchmark,
        });
    }

    let cash_r = config.cash_period_return();
    let mom_r = simple_returns(prices.momentum());
    let val_r = prices.value().map(simple_returns);
    let mom_base = prices.momentum()[0];
    let val_base = prices.value().map(|v| v[0]);

    let first_date = prices.dates()[0];
    benchmark
        .validate()
        .map_err(|source| SimError::Weights { date: first_date, source })?;
    if benchmark.value > 0.0 && val_r.is_none() {
        return Err(SimError::MissingValueSeries(first_date));
    }

    let mut periods = Vec::with_capacity(prices.len());
    let mut nav = config.base_nav;
    let mut bench_nav = config.base_nav;
    let mut prev_weights: Option<WeightVector> = None;

    for (t, (&date, decision)) in prices.dates().iter().zip(effective).enumerate() {
        if decision.date != date {
            return Err(SimError::DateMismatch {
                expected: date,
                found: decision.date,
            });
        }
        let w = decision.weights;
        w.validate()
            .map_err(|source| SimError::Weights { date, source })?;
        if w.value > 0.0 && val_r.is_none() {
            return Err(SimError::MissingValueSeries(date));
        }

        let value_close = prices.value().map(|v| v[t]);
        let (momentum_return, value_return) = if t == 0 {
            (None, None)
        } else {
            (Some(mom_r[t]), val_r.as_ref().map(|v| v[t]))
        };

        let (portfolio_return, benchmark_return) = match momentum_return {
            Some(rm) => {
                let rv = value_return.unwrap_or(f64::NAN);
                let rp = w.blend(rm, rv, cash_r);
                let rb = benchmark.blend(rm, rv, cash_r);
                nav *= 1.0 + rp;
                bench_nav *= 1.0 + rb;
                (Some(rp), Some(rb))
            }
            None => (None, None),
        };

        let contribution = |weight: f64, r: Option<f64>| match r {
            Some(r) if weight > 0.0 => weight * r,
            _ => 0.0,
        };

        periods.push(PortfolioPeriod {
            date,
            weights: w,
            regime: decision.regime,
            score: decision.score,
            momentum_return,
            value_return,
            cash_return: cash_r,
            portfolio_return,
            nav,
            benchmark_return,
            benchmark_nav: bench_nav,
            momentum_nav: config.base_nav * prices.momentum()[t] / mom_base,
            value_nav: value_close
                .zip(val_base)
                .map(|(c, b)| config.base_nav * c / b),
            momentum_contribution: contribution(w.momentum, momentum_return),
            value_contribution: contribution(w.value, value_return),
            cash_contribution: if t == 0 { 0.0 } else { w.cash * cash_r },
            turnover: prev_weights.map_or(0.0, |p| p.turnover(&w)),
        });
        prev_weights = Some(w);
    }

    Ok(Portfolio {
        periods,
        base_nav: config.base_nav,
        periods_per_year: config.periods_per_year,
        benchmark,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::lag::{enforce, Lag};
    use crate::signals::{assert_approx, make_aligned};

    fn constant(prices: &AlignedSeries, w: WeightVector) -> Vec<Decision> {
        prices
            .dates()
            .iter()
            .map(|d| Decision::new(*d, w, None))
            .collect()
    }

    #[test]
    fn nav_starts_at_base_and_compounds() {
        let prices = make_aligned(&[100.0, 110.0, 99.0], &[100.0, 100.0, 120.0]);
        let eff = constant(&prices, WeightVector::ALL_MOMENTUM);
        let p = simulate(&prices, &eff, &SimConfig::default(), WeightVector::BALANCED).unwrap();

        assert_eq!(p.periods[0].nav, 1000.0);
        assert_eq!(p.periods[0].portfolio_return, None);
        assert_approx(p.periods[1].nav, 1100.0, 1e-9);
        assert_approx(p.periods[2].nav, 990.0, 1e-9);
        // benchmark 50/50: +5%, then 0.5*(-10%) + 0.5*(+20%) = +5%
        assert_approx(p.periods[2].benchmark_nav, 1000.0 * 1.05 * 1.05, 1e-9);
        assert_approx(p.periods[2].momentum_nav, 990.0, 1e-9);
        assert_approx(p.periods[2].value_nav.unwrap(), 1200.0, 1e-9);
    }

    #[test]
    fn cash_earns_periodic_rate() {
        let prices = make_aligned(&[100.0, 50.0, 25.0], &[100.0, 100.0, 100.0]);
        let cfg = SimConfig {
            cash_annual_return: 0.05,
            ..SimConfig::default()
        };
        let eff = constant(&prices, WeightVector::ALL_CASH);
        let p = simulate(&prices, &eff, &cfg, WeightVector::BALANCED).unwrap();
        let monthly = 1.05_f64.powf(1.0 / 12.0) - 1.0;
        assert_approx(p.periods[2].nav, 1000.0 * (1.0 + monthly).powi(2), 1e-9);
        assert_approx(p.periods[1].cash_contribution, monthly, 1e-12);
    }

    #[test]
    fn lagged_switch_earns_next_period() {
        let prices = make_aligned(&[100.0, 100.0, 200.0], &[100.0, 100.0, 100.0]);
        let mut decisions = constant(&prices, WeightVector::ALL_VALUE);
        decisions[1].weights = WeightVector::ALL_MOMENTUM;
        let eff = enforce(&decisions, Lag::Period, WeightVector::ALL_VALUE);
        let p = simulate(&prices, &eff, &SimConfig::default(), WeightVector::BALANCED).unwrap();
        // Decision at t1 (momentum) earns t2's +100%.
        assert_approx(p.periods[2].nav, 2000.0, 1e-9);
        assert_approx(p.periods[2].momentum_contribution, 1.0, 1e-12);
        assert_approx(p.periods[2].turnover, 1.0, 1e-12);
    }

    #[test]
    fn value_weight_without_value_series_fails() {
        let two = make_aligned(&[100.0, 110.0], &[100.0, 100.0]);
        let prices = AlignedSeries::from_columns(
            two.dates().to_vec(),
            vec![("MOM".into(), vec![100.0, 110.0])],
        )
        .unwrap();
        let eff = constant(&prices, WeightVector::BALANCED);
        let bench = WeightVector::momentum_cash(0.75).unwrap();
        assert!(matches!(
            simulate(&prices, &eff, &SimConfig::default(), bench),
            Err(SimError::MissingValueSeries(_))
        ));
        let eff = constant(&prices, WeightVector::momentum_cash(0.8).unwrap());
        assert!(simulate(&prices, &eff, &SimConfig::default(), bench).is_ok());
    }

    #[test]
    fn length_and_date_checks() {
        let prices = make_aligned(&[100.0, 110.0], &[100.0, 100.0]);
        let eff = constant(&prices, WeightVector::BALANCED);
        assert!(matches!(
            simulate(&prices, &eff[..1], &SimConfig::default(), WeightVector::BALANCED),
            Err(SimError::LengthMismatch { .. })
        ));
        let mut shifted = eff.clone();
        shifted[1].date = shifted[0].date;
        assert!(matches!(
            simulate(&prices, &shifted, &SimConfig::default(), WeightVector::BALANCED),
            Err(SimError::DateMismatch { .. })
        ));
        let cfg = SimConfig {
            base_nav: 0.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            simulate(&prices, &eff, &cfg, WeightVector::BALANCED),
            Err(SimError::InvalidBase(_))
        ));
    }

    #[test]
    fn excess_return_vs_benchmark() {
        let prices = make_aligned(&[100.0, 110.0], &[100.0, 100.0]);
        let eff = constant(&prices, WeightVector::ALL_MOMENTUM);
        let p = simulate(&prices, &eff, &SimConfig::default(), WeightVector::BALANCED).unwrap();
        assert_eq!(p.periods[0].excess_return(), None);
        assert_approx(p.periods[1].excess_return().unwrap(), 0.05, 1e-12);
        assert_eq!(p.returns().len(), 1);
    }
}
