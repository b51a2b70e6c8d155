//! Backtest engine: lag enforcement and portfolio simulation.
//!
//! Decisions from a policy fold pass through [`lag::enforce`] before they
//! touch a return; [`portfolio::simulate`] only ever sees effective
//! allocations.

pub mod lag;
pub mod portfolio;

pub use lag::{enforce, Lag};
pub use portfolio::{simulate, Portfolio, PortfolioPeriod, SimConfig, SimError};
