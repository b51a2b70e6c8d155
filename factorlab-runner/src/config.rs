//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [data]
//! momentum = "data/momentum.csv"
//! value = "data/value.csv"
//!
//! [policy]
//! type = "hysteresis"
//! enter_band = 0.003
//! exit_band = 0.001
//! ```
//!
//! Every section and field is optional; omitted values take the defaults
//! of the underlying component.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use factorlab_core::data::Frequency;
use factorlab_core::domain::{WeightError, WeightVector};
use factorlab_core::engine::SimConfig;
use factorlab_core::policy::{
    build_policy, PolicyConfig, PolicyError, TrendFilter, TrendFilterConfig,
};

use crate::metrics::MetricsConfig;
use crate::sip::{SipConfig, SipError};

/// Content hash identifying a configuration.
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("invalid SIP settings: {0}")]
    Sip(#[from] SipError),

    #[error("invalid {field}: {source}")]
    Weights {
        field: &'static str,
        #[source]
        source: WeightError,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Seeded random-walk prices used when no CSV files are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub start: NaiveDate,
    pub months: usize,
    pub seed: u64,
    pub momentum_drift: f64,
    pub momentum_vol: f64,
    pub value_drift: f64,
    pub value_vol: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2005, 4, 1).unwrap_or_default(),
            months: 240,
            seed: 42,
            momentum_drift: 0.014,
            momentum_vol: 0.09,
            value_drift: 0.011,
            value_vol: 0.07,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// CSV of the momentum index (`Date`, `Close`).
    pub momentum: Option<PathBuf>,
    /// CSV of the value index; not needed by momentum-vs-cash policies.
    pub value: Option<PathBuf>,
    pub frequency: Frequency,
    /// Inclusive date range applied after resampling.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub synthetic: SyntheticConfig,
}

impl DataConfig {
    pub fn uses_files(&self) -> bool {
        self.momentum.is_some()
    }
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub data: DataConfig,
    pub policy: PolicyConfig,
    /// Allocation held before the first usable decision. Defaults to the
    /// policy's own choice.
    pub initial_weights: Option<WeightVector>,
    /// Risk-on/risk-off overlay on the strategy NAV.
    pub trend_filter: Option<TrendFilterConfig>,
    pub simulation: SimConfig,
    pub sip: SipConfig,
    pub metrics: MetricsConfig,
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        build_policy(&self.policy)?;
        if let Some(tf) = &self.trend_filter {
            TrendFilter::new(tf.clone())?;
        }
        self.sip.validate()?;

        if let Some(w) = self.initial_weights {
            w.validate().map_err(|source| ConfigError::Weights {
                field: "initial_weights",
                source,
            })?;
        }
        let sim = &self.simulation;
        if let Some(w) = sim.benchmark {
            w.validate().map_err(|source| ConfigError::Weights {
                field: "simulation.benchmark",
                source,
            })?;
        }
        if !sim.base_nav.is_finite() || sim.base_nav <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "simulation.base_nav must be positive, got {}",
                sim.base_nav
            )));
        }

        if self.policy.is_momentum_only() {
            let value_weight = [self.initial_weights, sim.benchmark]
                .iter()
                .flatten()
                .any(|w| w.value > 0.0);
            if value_weight {
                return Err(ConfigError::Invalid(format!(
                    "policy '{}' allocates between momentum and cash only",
                    self.policy.name()
                )));
            }
        } else if self.data.uses_files() && self.data.value.is_none() {
            return Err(ConfigError::Invalid(format!(
                "policy '{}' needs data.value",
                self.policy.name()
            )));
        }

        if let (Some(start), Some(end)) = (self.data.start, self.data.end) {
            if start > end {
                return Err(ConfigError::Invalid(format!(
                    "data.start {start} is after data.end {end}"
                )));
            }
        }
        if !self.data.uses_files() && self.data.synthetic.months < 2 {
            return Err(ConfigError::Invalid(
                "data.synthetic.months must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON form.
    ///
    /// Two configs with the same content share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    /// Periods per year of the series the backtest runs on. Synthetic
    /// prices are always monthly.
    pub fn periods_per_year(&self) -> f64 {
        if self.data.uses_files() {
            self.data.frequency.periods_per_year()
        } else {
            12.0
        }
    }

    /// Simulation settings with `periods_per_year` taken from the data.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            periods_per_year: self.periods_per_year(),
            ..self.simulation.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factorlab_core::policy::{HysteresisConfig, ThresholdConfig};

    #[test]
    fn empty_toml_is_the_default() {
        let config = BacktestConfig::from_toml_str("").unwrap();
        assert_eq!(config, BacktestConfig::default());
        assert_eq!(config.policy, PolicyConfig::Hysteresis(HysteresisConfig::default()));
        assert_eq!(config.simulation.base_nav, 1000.0);
        assert_eq!(config.sip.amount, 10_000.0);
    }

    #[test]
    fn parses_tagged_policy_and_sections() {
        let toml = r#"
            [data]
            momentum = "mom.csv"
            value = "val.csv"
            frequency = "weekly"
            start = "2010-01-01"

            [policy]
            type = "threshold"
            lookback = 1
            gain_threshold = 15.0

            [simulation]
            base_nav = 100.0
            benchmark = { momentum = 0.75, value = 0.25, cash = 0.0 }

            [sip]
            amount = 5000.0
            [sip.dynamic]
            base_multiplier = 1.0
        "#;
        let config = BacktestConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.data.frequency, Frequency::Weekly);
        assert_eq!(config.data.momentum, Some(PathBuf::from("mom.csv")));
        assert_eq!(
            config.policy,
            PolicyConfig::Threshold(ThresholdConfig {
                lookback: 1,
                gain_threshold: 15.0,
                ..ThresholdConfig::default()
            })
        );
        assert_eq!(config.simulation.base_nav, 100.0);
        assert_eq!(config.sim_config().periods_per_year, 52.0);
        assert_eq!(config.simulation.benchmark.map(|w| w.momentum), Some(0.75));
        // Omitted tiers fall back to the defaults.
        assert_eq!(config.sip.dynamic.map(|d| d.tiers.len()), Some(3));
    }

    #[test]
    fn rejects_invalid_policy_parameters() {
        let toml = r#"
            [policy]
            type = "hysteresis"
            enter_band = 0.001
            exit_band = 0.003
        "#;
        assert!(matches!(
            BacktestConfig::from_toml_str(toml),
            Err(ConfigError::Policy(PolicyError::InvalidBands { .. }))
        ));
    }

    #[test]
    fn rejects_unknown_policy_type() {
        let toml = "[policy]\ntype = \"moon_phase\"\n";
        assert!(matches!(
            BacktestConfig::from_toml_str(toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn two_leg_policy_needs_value_file() {
        let toml = "[data]\nmomentum = \"mom.csv\"\n";
        assert!(matches!(
            BacktestConfig::from_toml_str(toml),
            Err(ConfigError::Invalid(_))
        ));

        let toml = "[data]\nmomentum = \"mom.csv\"\n[policy]\ntype = \"risk_score\"\n";
        assert!(BacktestConfig::from_toml_str(toml).is_ok());
    }

    #[test]
    fn risk_score_rejects_value_benchmark() {
        let mut config = BacktestConfig {
            policy: PolicyConfig::RiskScore(Default::default()),
            ..BacktestConfig::default()
        };
        config.simulation.benchmark = Some(WeightVector::BALANCED);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unnormalised_weights() {
        let config = BacktestConfig {
            initial_weights: Some(WeightVector {
                momentum: 0.7,
                value: 0.7,
                cash: 0.0,
            }),
            ..BacktestConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Weights { field: "initial_weights", .. })
        ));
    }

    #[test]
    fn run_id_is_deterministic_and_content_sensitive() {
        let a = BacktestConfig::default();
        let mut b = a.clone();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.run_id().unwrap().len(), 64);

        b.simulation.cash_annual_return = 0.06;
        assert_ne!(a.run_id().unwrap(), b.run_id().unwrap());
    }

    #[test]
    fn synthetic_data_is_monthly() {
        let mut config = BacktestConfig::default();
        config.data.frequency = Frequency::Weekly;
        assert_eq!(config.periods_per_year(), 12.0);
        config.data.momentum = Some(PathBuf::from("mom.csv"));
        assert_eq!(config.periods_per_year(), 52.0);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = BacktestConfig::from_file(Path::new("/nonexistent/factorlab.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
