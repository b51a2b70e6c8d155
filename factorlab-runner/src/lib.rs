//! FactorLab Runner: evaluation, orchestration and export.
//!
//! This crate builds on `factorlab-core` to provide:
//! - Performance metrics, Newton-Raphson XIRR and SIP simulation
//! - Calendar, rolling and regime analytics
//! - TOML configuration with content-hash run ids
//! - Single-backtest runner and parallel parameter sweeps
//! - JSON, CSV and Markdown artifacts

pub mod analytics;
pub mod config;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod sip;
pub mod sweep;
pub mod xirr;

pub use config::{BacktestConfig, ConfigError, DataConfig, RunId, SyntheticConfig};
pub use export::{dashboard_json, generate_report, save_artifacts, ExportError};
pub use metrics::{MetricsConfig, PerformanceMetrics};
pub use runner::{
    load_prices, run_backtest, run_from_config, BacktestResult, LoadedPrices, RunError,
};
pub use sip::{simulate_sip, DynamicSip, SipConfig, SipError, SipResult, SipTier};
pub use sweep::{GridKind, ParamGrid, ParamSweep, SweepResults, SweepRow};
pub use xirr::{xirr, XirrOutcome};
