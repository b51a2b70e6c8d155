//! Risk-on/risk-off overlay on a portfolio NAV.
//!
//! Risk-on is left when the NAV closes below its slow (exit) moving average
//! and re-entered only when it closes above the fast (entry) one. While
//! either average is still warming up the filter is risk-on. A state
//! observed at the close of period t gates the weights of period t+1.

use super::{require_positive, PolicyError};
use crate::domain::{Decision, WeightVector};
use crate::signals::rolling::{rolling_mean, Window};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilterConfig {
    pub exit_window: usize,
    pub entry_window: usize,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        Self {
            exit_window: 10,
            entry_window: 6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendFilter {
    config: TrendFilterConfig,
}

impl TrendFilter {
    pub fn new(config: TrendFilterConfig) -> Result<Self, PolicyError> {
        require_positive("exit_window", config.exit_window)?;
        require_positive("entry_window", config.entry_window)?;
        Ok(Self { config })
    }

    /// Risk-on flag at the close of every period.
    pub fn risk_states(&self, nav: &[f64]) -> Vec<bool> {
        let exit_ma = rolling_mean(nav, Window::full(self.config.exit_window));
        let entry_ma = rolling_mean(nav, Window::full(self.config.entry_window));

        let mut risk_on = true;
        nav.iter()
            .zip(exit_ma.iter().zip(&entry_ma))
            .map(|(&v, (&exit, &entry))| {
                if exit.is_nan() || entry.is_nan() {
                    risk_on = true;
                } else if risk_on && v < exit {
                    risk_on = false;
                } else if !risk_on && v > entry {
                    risk_on = true;
                }
                risk_on
            })
            .collect()
    }
}

/// Send period t to cash whenever the filter was risk-off at t-1.
///
/// `effective` are already-lagged decisions and `nav` the unfiltered NAV
/// they produce; both must have the same length.
pub fn apply_trend_filter(effective: &[Decision], nav: &[f64], filter: &TrendFilter) -> Vec<Decision> {
    let states = filter.risk_states(nav);
    effective
        .iter()
        .enumerate()
        .map(|(t, d)| {
            let on = t == 0 || states.get(t - 1).copied().unwrap_or(true);
            if on {
                *d
            } else {
                Decision {
                    weights: WeightVector::ALL_CASH,
                    ..*d
                }
            }
        })
        .collect()
}
